//! Connectivity Monitor
//!
//! Binary online/offline flag fed by environment signals. Offline blocks new
//! user sends; already-armed retries still fire. The flag is published on a
//! `watch` channel so surfaces can render it without polling the controller.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Environment connectivity signal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivitySignal {
    /// The environment regained connectivity
    BecameOnline,
    /// The environment lost connectivity
    BecameOffline,
}

/// A change of the connectivity flag
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// offline → online
    WentOnline,
    /// online → offline
    WentOffline,
}

/// Tracks the connectivity flag
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor {
    /// Create a monitor with an initial state
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Current flag
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe to changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Apply an environment signal; duplicates return `None`
    pub fn apply(&self, signal: ConnectivitySignal) -> Option<Transition> {
        let online = matches!(signal, ConnectivitySignal::BecameOnline);
        self.set(online)
    }

    /// Drop to offline until the next online signal
    pub fn force_offline(&self) -> Option<Transition> {
        let transition = self.set(false);
        if transition.is_some() {
            tracing::info!("Connectivity forced offline after network failure");
        }
        transition
    }

    fn set(&self, online: bool) -> Option<Transition> {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return None;
        }
        tracing::debug!(online, "Connectivity changed");
        Some(if online {
            Transition::WentOnline
        } else {
            Transition::WentOffline
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_signals_ignored() {
        let monitor = ConnectivityMonitor::default();
        assert!(monitor.is_online());
        assert_eq!(monitor.apply(ConnectivitySignal::BecameOnline), None);
        assert_eq!(
            monitor.apply(ConnectivitySignal::BecameOffline),
            Some(Transition::WentOffline)
        );
        assert_eq!(monitor.apply(ConnectivitySignal::BecameOffline), None);
        assert!(!monitor.is_online());
        assert_eq!(
            monitor.apply(ConnectivitySignal::BecameOnline),
            Some(Transition::WentOnline)
        );
    }

    #[test]
    fn test_force_offline() {
        let monitor = ConnectivityMonitor::new(true);
        assert_eq!(monitor.force_offline(), Some(Transition::WentOffline));
        assert_eq!(monitor.force_offline(), None);
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();
        monitor.apply(ConnectivitySignal::BecameOffline);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
    }
}
