//! Fire-and-forget change notifications for editors and other observers.
//!
//! Listeners are held weakly. A listener that has been dropped is pruned the
//! next time a change is broadcast; that is never an error.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

pub trait ChangeListener: Send + Sync {
    /// Called after `source` changed. No acknowledgment is expected.
    fn change_notified(&self, source: &str);
}

#[derive(Default)]
pub struct ChangeBroadcaster {
    listeners: Mutex<Vec<Weak<dyn ChangeListener>>>,
}

impl ChangeBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.listeners.lock().push(Arc::downgrade(listener));
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ChangeListener>) {
        let target = Arc::downgrade(listener);
        self.listeners.lock().retain(|l| !l.ptr_eq(&target));
    }

    /// Number of listeners that are still alive.
    pub fn num_listeners(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }

    pub fn send_change(&self, source: &str) {
        // Upgrade under the lock, call outside of it so listeners may
        // register or query the sender without deadlocking.
        let alive: Vec<Arc<dyn ChangeListener>> = {
            let mut listeners = self.listeners.lock();
            let mut alive = Vec::with_capacity(listeners.len());
            listeners.retain(|weak| match weak.upgrade() {
                Some(listener) => {
                    alive.push(listener);
                    true
                }
                None => false,
            });
            alive
        };

        for listener in alive {
            listener.change_notified(source);
        }
    }
}

impl std::fmt::Debug for ChangeBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBroadcaster")
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}
