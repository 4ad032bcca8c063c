//! Single-subscriber callback slots
//!
//! Each event type has at most one active handler. Setting a handler
//! replaces the previous one; handlers are cloned out of the slot before
//! they run, so a handler may freely replace or clear slots itself.

use std::sync::{Arc, RwLock};

use crate::types::RecognitionResult;

/// Engine → manager: one recognition emission
pub type ResultHandler = dyn Fn(RecognitionResult) + Send + Sync;

/// Engine → manager: listening flag changed
pub type StateHandler = dyn Fn(bool) + Send + Sync;

/// Manager → caller: `(command, target_id)`
pub type CommandHandler = dyn Fn(&str, &str) + Send + Sync;

/// Manager → caller: raw recognized text
pub type RecognitionHandler = dyn Fn(&str) + Send + Sync;

/// Manager → caller: listening flag changed
pub type ListeningHandler = dyn Fn(bool) + Send + Sync;

pub struct CallbackSlot<F: ?Sized> {
    handler: RwLock<Option<Arc<F>>>,
}

impl<F: ?Sized> CallbackSlot<F> {
    pub fn new() -> Self {
        Self {
            handler: RwLock::new(None),
        }
    }

    pub fn set(&self, handler: Option<Arc<F>>) {
        let mut slot = match self.handler.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = handler;
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn get(&self) -> Option<Arc<F>> {
        match self.handler.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}

impl<F: ?Sized> Default for CallbackSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_slot_replaces_handler() {
        let slot: CallbackSlot<StateHandler> = CallbackSlot::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        slot.set(Some(Arc::new(move |_: bool| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        let counter = second.clone();
        slot.set(Some(Arc::new(move |_: bool| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        if let Some(handler) = slot.get() {
            handler(true);
        }
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        slot.clear();
        assert!(!slot.is_set());
    }
}
