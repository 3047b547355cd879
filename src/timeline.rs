use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::batch::AnnotatedRecord;

const NOTES_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineGroup {
    /// `YYYY-MM`
    pub key: String,
    /// e.g. `January 2023`
    pub label: String,
    pub year: i32,
    pub month: u32,
    pub records: Vec<AnnotatedRecord>,
}

/// Buckets records by travel month, newest month first. Records inside a
/// group keep their input order.
pub fn group_by_month(records: &[AnnotatedRecord]) -> Vec<TimelineGroup> {
    let mut groups: Vec<TimelineGroup> = Vec::new();
    for annotated in records {
        let date = annotated.record.travel_date;
        let key = month_key(date);
        match groups.iter_mut().find(|group| group.key == key) {
            Some(group) => group.records.push(annotated.clone()),
            None => groups.push(TimelineGroup {
                key,
                label: date.format("%B %Y").to_string(),
                year: date.year(),
                month: date.month(),
                records: vec![annotated.clone()],
            }),
        }
    }
    groups.sort_by(|a, b| b.key.cmp(&a.key));
    groups
}

fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// `Jan 1, 2023`
pub fn format_travel_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}

pub fn notes_preview(notes: &str) -> String {
    let mut chars = notes.chars();
    let preview: String = chars.by_ref().take(NOTES_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{preview}...")
    } else {
        preview
    }
}
