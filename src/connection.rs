use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::info;

/// Whether the quote server session is currently open.
///
/// Written by the poll loop and, through a [`DisconnectNotifier`], by the
/// transport when the server closes the session on its own. Each update is a
/// single atomic store, so no lock is needed.
#[derive(Debug, Default)]
pub struct ConnectionState {
    connected: Arc<AtomicBool>,
}

/// Cloneable handle the transport uses to report a disconnection initiated by
/// the server.
#[derive(Debug, Clone)]
pub struct DisconnectNotifier {
    connected: Arc<AtomicBool>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self) {
        self.connected.store(true, Ordering::Release);
    }

    pub fn set_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    pub fn notifier(&self) -> DisconnectNotifier {
        DisconnectNotifier::from(self)
    }
}

impl From<&ConnectionState> for DisconnectNotifier {
    fn from(value: &ConnectionState) -> Self {
        Self { connected: value.connected.clone() }
    }
}

impl DisconnectNotifier {
    /// Marks the session as closed.
    pub fn notify(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            info!("Disconnected from HTTP server by peer");
        }
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn test0_starts_disconnected() {
        assert!(!ConnectionState::new().is_connected());
    }

    #[test]
    fn test1_notifier_resets_flag_from_another_thread() {
        let state = ConnectionState::new();
        state.set_connected();
        let notifier = state.notifier();
        thread::spawn(move || notifier.notify()).join().unwrap();
        assert!(!state.is_connected());
    }

    #[test]
    fn test2_notify_when_already_disconnected_is_harmless() {
        let state = ConnectionState::new();
        state.notifier().notify();
        assert!(!state.is_connected());
        state.set_connected();
        assert!(state.is_connected());
    }
}
