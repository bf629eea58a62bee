//! Destinations for the events of a run.

use async_trait::async_trait;
use tokio::sync::mpsc;

use hottake_protocol::Event;
use hottake_shared::{HotTakeError, Result};

/// Receives the events of one run, in order.
///
/// A sink whose consumer has gone away returns [`HotTakeError::Cancelled`]
/// and the run stops at its next suspension point.
#[async_trait]
pub trait EventSink: Send {
    async fn emit(&mut self, event: Event) -> Result<()>;

    /// Whether the consumer is known to be gone.
    fn is_closed(&self) -> bool {
        false
    }
}

#[async_trait]
impl EventSink for mpsc::Sender<Event> {
    async fn emit(&mut self, event: Event) -> Result<()> {
        self.send(event).await.map_err(|_| HotTakeError::Cancelled)
    }

    fn is_closed(&self) -> bool {
        mpsc::Sender::is_closed(self)
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Vec<Event>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn emit(&mut self, event: Event) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}
