//! Fan-out of action lifecycle events to registered listeners.
//!
//! Listeners run synchronously in registration order. A listener that
//! returns an error or panics is logged and skipped; the remaining listeners
//! still receive the event.

use platform_core::events::ActionEvent;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A callback receiving every emitted event.
pub type EventListener = Arc<dyn Fn(&ActionEvent) -> Result<(), String> + Send + Sync>;

/// Handle returned by [`ActionEventEmitter::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered observer list. Duplicates are allowed.
#[derive(Default)]
pub struct ActionEventEmitter {
    listeners: RwLock<Vec<(ListenerId, EventListener)>>,
    next_id: AtomicU64,
}

impl ActionEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Adding the same listener twice registers it twice.
    pub fn add_listener(&self, listener: EventListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Convenience for closures.
    pub fn add_listener_fn<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&ActionEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(f))
    }

    /// Remove one registration. Returns `false` if the id is unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match listeners.iter().position(|(lid, _)| *lid == id) {
            Some(pos) => {
                listeners.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every listener.
    pub fn emit(&self, event: &ActionEvent) {
        // Snapshot so listeners may add or remove listeners while running.
        let snapshot: Vec<(ListenerId, EventListener)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(
                    listener = ?id,
                    event = event.event_name(),
                    action_id = %event.action_id,
                    error = %e,
                    "Event listener failed"
                ),
                Err(_) => tracing::error!(
                    listener = ?id,
                    event = event.event_name(),
                    action_id = %event.action_id,
                    "Event listener panicked"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_core::events::ActionEventKind;
    use std::sync::Mutex;

    fn event() -> ActionEvent {
        ActionEvent::new(ActionEventKind::ActionExecuted, "settings.getSetting")
    }

    #[test]
    fn test_listeners_called_in_order() {
        let emitter = ActionEventEmitter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for n in 1..=3 {
            let log = Arc::clone(&log);
            emitter.add_listener_fn(move |_| {
                log.lock().unwrap().push(n);
                Ok(())
            });
        }
        emitter.emit(&event());
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_listener_called_twice() {
        let emitter = ActionEventEmitter::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let listener: EventListener = Arc::new(move |_| {
            *c.lock().unwrap() += 1;
            Ok(())
        });
        emitter.add_listener(Arc::clone(&listener));
        emitter.add_listener(listener);
        emitter.emit(&event());
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_remove_listener() {
        let emitter = ActionEventEmitter::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let id = emitter.add_listener_fn(move |_| {
            *c.lock().unwrap() += 1;
            Ok(())
        });
        assert_eq!(emitter.listener_count(), 1);
        assert!(emitter.remove_listener(id));
        assert!(!emitter.remove_listener(id));
        emitter.emit(&event());
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let emitter = ActionEventEmitter::new();
        let reached = Arc::new(Mutex::new(Vec::new()));

        emitter.add_listener_fn(|_| Err("audit backend down".to_string()));
        emitter.add_listener_fn(|_| panic!("listener bug"));
        let r = Arc::clone(&reached);
        emitter.add_listener_fn(move |e| {
            r.lock().unwrap().push(e.action_id.clone());
            Ok(())
        });

        emitter.emit(&event());
        assert_eq!(*reached.lock().unwrap(), vec!["settings.getSetting".to_string()]);
    }

    #[test]
    fn test_emit_with_no_listeners() {
        ActionEventEmitter::new().emit(&event());
    }
}
