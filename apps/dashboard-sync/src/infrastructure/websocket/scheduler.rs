//! Tokio-backed reconnect timers.

use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::application::ports::{EventSink, Scheduler, TimerId};

/// One spawned sleep per timer; expiry is delivered as `SyncEvent::Timer`.
#[derive(Debug)]
pub struct TokioScheduler {
    events: EventSink,
    handle: Handle,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioScheduler {
    /// Create a scheduler spawning timers on `handle`.
    #[must_use]
    pub fn new(events: EventSink, handle: Handle) -> Self {
        Self {
            events,
            handle,
            timers: HashMap::new(),
        }
    }

    /// Timers that have not fired or been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.timers.values().filter(|t| !t.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, id: TimerId, delay: Duration) {
        self.timers.retain(|_, task| !task.is_finished());

        let events = self.events.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            events.timer(id);
        });

        if let Some(previous) = self.timers.insert(id, task) {
            previous.abort();
        }
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.timers.remove(&id) {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.timers.drain() {
            task.abort();
        }
    }
}
