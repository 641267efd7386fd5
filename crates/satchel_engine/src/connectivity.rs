//! Connectivity signal abstraction and a switchable test double.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Handle returned by [`ConnectivityMonitor::subscribe`].
pub type SubscriptionId = u64;

/// Callback invoked with the new state on every connectivity change.
pub type ConnectivityListener = Box<dyn Fn(bool) + Send + Sync>;

/// Source of truth for whether the device currently has a network path
/// to the remote.
///
/// The engine consults this before every cycle and subscribes to it so
/// a reconnect can trigger an immediate sync.
pub trait ConnectivityMonitor: Send + Sync {
    /// Current connectivity state.
    fn is_connected(&self) -> bool;

    /// Registers a listener for state changes.
    fn subscribe(&self, listener: ConnectivityListener) -> SubscriptionId;

    /// Removes a previously registered listener. Unknown ids are
    /// ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// In-memory [`ConnectivityMonitor`] whose state tests flip by hand.
pub struct MockConnectivity {
    connected: AtomicBool,
    listeners: Mutex<HashMap<SubscriptionId, ConnectivityListener>>,
    next_id: AtomicU64,
}

impl MockConnectivity {
    /// Creates a monitor in the given state.
    #[must_use]
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Sets the state, notifying listeners only on an actual change.
    pub fn set_connected(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if previous == connected {
            return;
        }
        for listener in self.listeners.lock().values() {
            listener(connected);
        }
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Default for MockConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor for MockConnectivity {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self, listener: ConnectivityListener) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(id, listener);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.lock().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn notifies_only_on_change() {
        let monitor = MockConnectivity::new(true);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let id = monitor.subscribe(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.set_connected(true); // no change
        monitor.set_connected(false);
        monitor.set_connected(true);
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        monitor.unsubscribe(id);
        monitor.set_connected(false);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.listener_count(), 0);
    }
}
