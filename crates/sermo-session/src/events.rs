use sermo_core::SpeechEvent;
use std::sync::RwLock;

type Subscriber = Box<dyn Fn(&SpeechEvent) + Send + Sync>;

/// An explicit subscriber list the reader activity broadcasts through.
///
/// Callbacks run synchronously on the reader task, in registration order,
/// so subscribers observe events exactly in backend-arrival order. Keep
/// callbacks cheap; a slow subscriber stalls result delivery, not capture.
#[derive(Default)]
pub struct EventSubscribers {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventSubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&SpeechEvent) + Send + Sync + 'static,
    {
        self.subscribers.write().unwrap().push(Box::new(callback));
    }

    pub fn publish(&self, event: &SpeechEvent) {
        for subscriber in self.subscribers.read().unwrap().iter() {
            subscriber(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
