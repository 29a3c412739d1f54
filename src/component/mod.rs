//! Host-facing plugin surface.
//!
//! The host drives a component through five lifecycle hooks, in order:
//! `initialize`, `start`, `process` (any number of times), `stop`,
//! `uninitialize`. It never runs two hooks concurrently on one instance.
//! Events flow back to the host through the [`Emitter`]s it hands over in
//! `initialize`.

pub mod config;
pub mod relay;
pub mod transport;
pub mod twitch;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::backend::twitch::Result;

pub use config::{Mode, SendArgs, TwitchConfig, Variant};
pub use relay::{Listeners, MessageEvent};
pub use transport::{AuthFlow, ChatClientFactory, ChatTransport, TransportFactory};
pub use twitch::Twitch;

/// Optional result value returned by `process`
pub type Field = Option<Value>;

/// Sink supplied by the host for events produced by a component
pub trait Emitter: Send + Sync {
    fn emit(&self, data: Value);
}

/// Lifecycle interface the host invokes on every component
#[async_trait]
pub trait Component<C: Send + Sync>: Send {
    async fn initialize(&mut self, config: &C, emitter: Arc<dyn Emitter>) -> Result<()>;

    async fn start(&mut self, config: &C) -> Result<()>;

    async fn process(&mut self, config: &C) -> Result<Field>;

    async fn stop(&mut self, config: &C) -> Result<()>;

    async fn uninitialize(&mut self) -> Result<()>;
}

/// Emitter that forwards events into an unbounded channel
#[derive(Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<Value>,
}

impl ChannelEmitter {
    pub fn new(tx: mpsc::UnboundedSender<Value>) -> Self {
        Self { tx }
    }

    /// Create an emitter together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Emitter for ChannelEmitter {
    fn emit(&self, data: Value) {
        if self.tx.send(data).is_err() {
            log::debug!("Dropping event: receiver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_emitter() {
        let (emitter, mut rx) = ChannelEmitter::channel();
        emitter.emit(serde_json::json!({ "a": 1 }));
        assert_eq!(rx.recv().await, Some(serde_json::json!({ "a": 1 })));

        drop(rx);
        // a closed receiver is not an error for the sender
        emitter.emit(serde_json::json!({ "a": 2 }));
    }
}
