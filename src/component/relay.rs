use serde::Serialize;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use super::Emitter;
use crate::backend::twitch::ChatMessage;

/// Event relayed to listeners for each inbound chat message
#[derive(Debug, Clone, Serialize)]
pub struct MessageEvent {
    pub message: ChatMessage,
}

impl MessageEvent {
    pub fn to_field(&self) -> Value {
        serde_json::json!({
            "message": {
                "channel": self.message.channel,
                "user": self.message.user,
                "message": self.message.message,
            }
        })
    }
}

/// Ordered registry of listeners
#[derive(Default)]
pub struct Listeners {
    emitters: RwLock<Vec<Arc<dyn Emitter>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, emitter: Arc<dyn Emitter>) {
        self.emitters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(emitter);
    }

    pub fn clear(&self) {
        self.emitters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.emitters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `data` to every listener in registration order
    ///
    /// A listener that panics is logged and skipped; the rest still receive the event.
    pub fn broadcast(&self, data: &Value) {
        let emitters: Vec<Arc<dyn Emitter>> = self
            .emitters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (index, emitter) in emitters.iter().enumerate() {
            let delivered = catch_unwind(AssertUnwindSafe(|| emitter.emit(data.clone())));
            if delivered.is_err() {
                log::error!("Listener {} panicked while handling an event", index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<(&'static str, Value)>>>,
    }

    impl Emitter for Recorder {
        fn emit(&self, data: Value) {
            self.log.lock().unwrap().push((self.name, data));
        }
    }

    struct Panicker;

    impl Emitter for Panicker {
        fn emit(&self, _data: Value) {
            panic!("listener failure");
        }
    }

    #[test]
    fn test_broadcast_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::new();
        listeners.register(Arc::new(Recorder { name: "first", log: log.clone() }));
        listeners.register(Arc::new(Panicker));
        listeners.register(Arc::new(Recorder { name: "second", log: log.clone() }));

        let event = MessageEvent {
            message: ChatMessage {
                channel: "c".to_string(),
                user: "u".to_string(),
                message: "m".to_string(),
            },
        };
        listeners.broadcast(&event.to_field());

        let log = log.lock().unwrap();
        let names: Vec<_> = log.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(
            log[0].1,
            serde_json::json!({ "message": { "channel": "c", "user": "u", "message": "m" } })
        );
    }

    #[test]
    fn test_clear() {
        let listeners = Listeners::new();
        listeners.register(Arc::new(Recorder::default()));
        assert_eq!(listeners.len(), 1);
        listeners.clear();
        assert!(listeners.is_empty());
    }
}
