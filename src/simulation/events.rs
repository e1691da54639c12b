//! Synchronous event bus for time-series consumers.

use serde::{Deserialize, Serialize};

/// Events emitted by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationEvent {
    /// The integer simulated hour changed (also fired once at hour 0)
    HourChange { hour: u64 },
    Restart,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulationEventKind {
    HourChange,
    Restart,
    Start,
}

impl SimulationEvent {
    pub fn kind(&self) -> SimulationEventKind {
        match self {
            SimulationEvent::HourChange { .. } => SimulationEventKind::HourChange,
            SimulationEvent::Restart => SimulationEventKind::Restart,
            SimulationEvent::Start => SimulationEventKind::Start,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Box<dyn FnMut(&SimulationEvent) + Send + Sync>;

struct Subscription {
    id: ListenerId,
    kind: SimulationEventKind,
    listener: Listener,
}

/// Listeners run on the emitting thread, in subscription order
#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, kind: SimulationEventKind, listener: F) -> ListenerId
    where
        F: FnMut(&SimulationEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            kind,
            listener: Box::new(listener),
        });
        id
    }

    /// Returns false if the listener was already gone
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|subscription| subscription.id != id);
        self.subscriptions.len() != before
    }

    pub fn emit(&mut self, event: SimulationEvent) {
        let kind = event.kind();
        for subscription in self
            .subscriptions
            .iter_mut()
            .filter(|subscription| subscription.kind == kind)
        {
            (subscription.listener)(&event);
        }
    }

    pub fn listener_count(&self, kind: SimulationEventKind) -> usize {
        self.subscriptions
            .iter()
            .filter(|subscription| subscription.kind == kind)
            .count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn listeners_only_see_their_kind() {
        let mut bus = EventBus::new();
        let hours = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&hours);
        bus.subscribe(SimulationEventKind::HourChange, move |event| {
            if let SimulationEvent::HourChange { hour } = event {
                sink.lock().unwrap().push(*hour);
            }
        });

        bus.emit(SimulationEvent::HourChange { hour: 0 });
        bus.emit(SimulationEvent::Start);
        bus.emit(SimulationEvent::HourChange { hour: 1 });

        assert_eq!(*hours.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let id = bus.subscribe(SimulationEventKind::Restart, move |_| {
            *sink.lock().unwrap() += 1;
        });

        bus.emit(SimulationEvent::Restart);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(SimulationEvent::Restart);

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(bus.listener_count(SimulationEventKind::Restart), 0);
    }
}
