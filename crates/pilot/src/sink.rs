//! Event sink fanning command events out to observers.
//!
//! Publishing never blocks: each observer reads from its own position in a
//! bounded ring, and an observer that falls behind loses the oldest events
//! instead of stalling command execution.

use pilot_core::{Event, EventPayload};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// Default ring capacity when no config is supplied.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<Event>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> Observer {
        Observer {
            rx: self.tx.subscribe(),
            missed: 0,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event to every current observer.
    ///
    /// Having no observers is not an error.
    pub fn broadcast(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn command_event(&self, command: &str, payload: EventPayload) {
        self.broadcast(Event::for_command(command, payload));
    }

    pub fn task_event(&self, payload: EventPayload) {
        self.broadcast(Event::for_task(payload));
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

/// A single observer's view of the event stream.
#[derive(Debug)]
pub struct Observer {
    rx: broadcast::Receiver<Event>,
    missed: u64,
}

impl Observer {
    /// Events dropped because this observer fell behind, since subscribing.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Next event, or `None` once the sink is gone.
    ///
    /// Lagging is logged, counted in `missed`, and skipped over.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => self.lagged(missed),
                Err(RecvError::Closed) => {
                    debug!("event sink closed");
                    return None;
                }
            }
        }
    }

    /// Non-blocking variant; `None` when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => self.lagged(missed),
                Err(_) => return None,
            }
        }
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    fn lagged(&mut self, missed: u64) {
        self.missed += missed;
        warn!(missed, total = self.missed, "event observer lagged; oldest events dropped");
    }
}
