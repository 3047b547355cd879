use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use tracing::trace;

use crate::records::RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Map,
    Timeline,
}

/// What a subscribed view is asked to do after a selection change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionEvent {
    /// Every view: redraw highlight state.
    Highlighted { id: Option<RecordId> },
    /// Map only: open the marker popup and bring the marker into view.
    FocusMarker { id: RecordId },
    /// Timeline only: smoothly scroll the item to the middle of the list.
    ScrollIntoView { id: RecordId },
}

pub type SelectionListener = Arc<dyn Fn(&SelectionEvent) + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: u64,
    view: ViewKind,
    listener: SelectionListener,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// The one authoritative "highlighted record" shared by map and timeline.
///
/// Views never call each other; they report clicks here and react to the
/// events routed back to them. Last write wins, and listeners observe
/// selections in the order they were stored.
#[derive(Default)]
pub struct SelectionCoordinator {
    // Held for a whole selection (store plus events). Reentrant so listeners
    // may select again from inside a callback.
    dispatch: ReentrantMutex<()>,
    highlighted: Mutex<Option<RecordId>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber: AtomicU64,
}

impl SelectionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn highlighted(&self) -> Option<RecordId> {
        self.highlighted.lock().clone()
    }

    pub fn is_highlighted(&self, id: &RecordId) -> bool {
        self.highlighted.lock().as_ref() == Some(id)
    }

    pub fn subscribe(&self, view: ViewKind, listener: SelectionListener) -> SubscriptionId {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(Subscriber { id, view, listener });
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.id != subscription.0);
    }

    /// A timeline item was clicked: highlight it and focus its map marker.
    pub fn select_from_timeline(&self, id: RecordId) {
        let _dispatch = self.dispatch.lock();
        self.set_highlight(Some(id.clone()));
        self.notify(ViewKind::Map, &SelectionEvent::FocusMarker { id });
    }

    /// A map marker was clicked: highlight it and scroll the timeline to it.
    pub fn select_from_map(&self, id: RecordId) {
        let _dispatch = self.dispatch.lock();
        self.set_highlight(Some(id.clone()));
        self.notify(ViewKind::Timeline, &SelectionEvent::ScrollIntoView { id });
    }

    pub fn clear(&self) {
        let _dispatch = self.dispatch.lock();
        self.set_highlight(None);
    }

    fn set_highlight(&self, id: Option<RecordId>) {
        {
            let mut highlighted = self.highlighted.lock();
            trace!(from = ?*highlighted, to = ?id, "selection changed");
            *highlighted = id.clone();
        }
        let event = SelectionEvent::Highlighted { id };
        for subscriber in self.snapshot_subscribers() {
            (subscriber.listener)(&event);
        }
    }

    fn notify(&self, view: ViewKind, event: &SelectionEvent) {
        for subscriber in self.snapshot_subscribers() {
            if subscriber.view == view {
                (subscriber.listener)(event);
            }
        }
    }

    // Listeners run without the subscriber lock held so they may subscribe.
    fn snapshot_subscribers(&self) -> Vec<Subscriber> {
        self.subscribers.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(
        coordinator: &SelectionCoordinator,
        view: ViewKind,
    ) -> (SubscriptionId, Arc<Mutex<Vec<SelectionEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = coordinator.subscribe(
            view,
            Arc::new(move |event: &SelectionEvent| sink.lock().push(event.clone())),
        );
        (subscription, events)
    }

    #[test]
    fn starts_with_nothing_highlighted() {
        let coordinator = SelectionCoordinator::new();
        assert_eq!(coordinator.highlighted(), None);
    }

    #[test]
    fn map_click_scrolls_timeline_only() {
        let coordinator = SelectionCoordinator::new();
        let (_, map_events) = recorder(&coordinator, ViewKind::Map);
        let (_, timeline_events) = recorder(&coordinator, ViewKind::Timeline);

        coordinator.select_from_map(RecordId::new("r1"));

        assert_eq!(coordinator.highlighted(), Some(RecordId::new("r1")));
        assert_eq!(
            *map_events.lock(),
            vec![SelectionEvent::Highlighted {
                id: Some(RecordId::new("r1"))
            }]
        );
        assert_eq!(
            timeline_events.lock().last(),
            Some(&SelectionEvent::ScrollIntoView {
                id: RecordId::new("r1")
            })
        );
    }

    #[test]
    fn timeline_click_focuses_map_marker() {
        let coordinator = SelectionCoordinator::new();
        let (_, map_events) = recorder(&coordinator, ViewKind::Map);
        let (_, timeline_events) = recorder(&coordinator, ViewKind::Timeline);

        coordinator.select_from_timeline(RecordId::new("r2"));

        assert_eq!(
            map_events.lock().last(),
            Some(&SelectionEvent::FocusMarker {
                id: RecordId::new("r2")
            })
        );
        assert_eq!(timeline_events.lock().len(), 1);
    }

    #[test]
    fn reselecting_is_idempotent_and_clear_resets() {
        let coordinator = SelectionCoordinator::new();
        let id = RecordId::new("same");

        coordinator.select_from_map(id.clone());
        coordinator.select_from_timeline(id.clone());
        assert_eq!(coordinator.highlighted(), Some(id.clone()));
        assert!(coordinator.is_highlighted(&id));

        coordinator.clear();
        assert_eq!(coordinator.highlighted(), None);
        coordinator.clear();
        assert_eq!(coordinator.highlighted(), None);
    }

    #[test]
    fn last_selection_wins_and_unsubscribed_views_go_quiet() {
        let coordinator = SelectionCoordinator::new();
        let (subscription, events) = recorder(&coordinator, ViewKind::Timeline);

        coordinator.select_from_map(RecordId::new("a"));
        coordinator.select_from_timeline(RecordId::new("b"));
        assert_eq!(coordinator.highlighted(), Some(RecordId::new("b")));

        coordinator.unsubscribe(subscription);
        let seen = events.lock().len();
        coordinator.select_from_map(RecordId::new("c"));
        assert_eq!(events.lock().len(), seen);
    }

    #[test]
    fn listeners_see_concurrent_selections_in_stored_order() {
        let coordinator = Arc::new(SelectionCoordinator::new());
        let last_seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last_seen);
        coordinator.subscribe(
            ViewKind::Map,
            Arc::new(move |event: &SelectionEvent| {
                if let SelectionEvent::Highlighted { id } = event {
                    *sink.lock() = id.clone();
                }
            }),
        );

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let coordinator = Arc::clone(&coordinator);
                scope.spawn(move || {
                    for round in 0..200 {
                        let id = RecordId::new(format!("w{worker}-{round}"));
                        if round % 2 == 0 {
                            coordinator.select_from_map(id);
                        } else {
                            coordinator.select_from_timeline(id);
                        }
                    }
                });
            }
        });

        assert!(coordinator.highlighted().is_some());
        assert_eq!(*last_seen.lock(), coordinator.highlighted());
    }

    #[test]
    fn listeners_may_select_again_from_a_callback() {
        let coordinator = Arc::new(SelectionCoordinator::new());
        let weak = Arc::downgrade(&coordinator);
        coordinator.subscribe(
            ViewKind::Timeline,
            Arc::new(move |event: &SelectionEvent| {
                if let (SelectionEvent::ScrollIntoView { .. }, Some(coordinator)) =
                    (event, weak.upgrade())
                {
                    coordinator.clear();
                }
            }),
        );

        coordinator.select_from_map(RecordId::new("bounced"));
        assert_eq!(coordinator.highlighted(), None);
    }
}
