//! Named event handler registry.
//!
//! Handlers are plain callbacks keyed by event name. Several handlers may be
//! registered for one name; they run in registration order on the session
//! owner, never on the I/O task.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

/// Callback invoked with the event payload.
pub type Handler = Box<dyn FnMut(&Value) + Send>;

/// Handlers grouped by event name.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Handler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, handlers) in &self.handlers {
            map.entry(name, &handlers.len());
        }
        map.finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`, after any existing ones.
    pub fn on<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.handlers
            .entry(event.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Runs every handler registered for `event`. Returns how many ran.
    pub fn dispatch(&mut self, event: &str, payload: &Value) -> usize {
        let Some(handlers) = self.handlers.get_mut(event) else {
            return 0;
        };
        for handler in handlers.iter_mut() {
            handler(payload);
        }
        handlers.len()
    }

    /// Detaches every handler.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
