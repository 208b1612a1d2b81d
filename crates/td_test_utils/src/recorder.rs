//! Event recording for assertions on what a game announced.

use std::cell::RefCell;
use std::rc::Rc;

use td_core::events::{EventBus, EventKind, GameEvent, GoldReason};

/// Records every event published on a bus.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<GameEvent>>>,
}

impl EventRecorder {
    /// Subscribe a new recorder to every topic on `bus`.
    pub fn attach(bus: &mut EventBus) -> Self {
        let recorder = Self::default();
        let log = Rc::clone(&recorder.events);
        bus.subscribe_all(move |event| {
            log.borrow_mut().push(event.clone());
            Ok(())
        });
        recorder
    }

    /// Copy of everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<GameEvent> {
        self.events.borrow().clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<GameEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Number of recorded events of one kind.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.borrow().iter().filter(|e| e.kind() == kind).count()
    }

    /// Recorded events of one kind, in order.
    #[must_use]
    pub fn of_kind(&self, kind: EventKind) -> Vec<GameEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Kinds of every recorded event, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.borrow().iter().map(GameEvent::kind).collect()
    }

    /// Gold deltas with their reasons, in order.
    #[must_use]
    pub fn gold_changes(&self) -> Vec<(i64, GoldReason)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                GameEvent::GoldChanged { delta, reason, .. } => Some((*delta, *reason)),
                _ => None,
            })
            .collect()
    }
}
