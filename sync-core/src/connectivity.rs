//! Connectivity state machine.
//!
//! Two states, driven by platform online/offline signals (never polled).
//! The machine takes a signal as input and produces a new state plus a list
//! of actions to execute. The only action with a correctness impact is
//! [`ConnectivityAction::TriggerDrain`], emitted on `Offline → Online`.
//!
//! The actual drain is performed by sync-client, not by this module.

/// Online/offline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// No network; mutations accumulate in the queue.
    #[default]
    Offline,
    /// Network available; the queue may be drained.
    Online,
}

impl Connectivity {
    /// Create a new state machine in the Offline state.
    ///
    /// Starting offline means the first "online" signal after startup
    /// drains whatever the previous session left in the queue.
    pub fn new() -> Self {
        Self::Offline
    }

    /// Process a connectivity signal and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. Repeated signals for the
    /// current state produce no actions.
    pub fn on_signal(self, online: bool) -> (Self, Vec<ConnectivityAction>) {
        match (self, online) {
            (Self::Offline, true) => (
                Self::Online,
                vec![
                    ConnectivityAction::EmitEvent(ConnectivityEvent::WentOnline),
                    ConnectivityAction::TriggerDrain,
                ],
            ),
            (Self::Online, false) => (
                Self::Offline,
                vec![ConnectivityAction::EmitEvent(ConnectivityEvent::WentOffline)],
            ),
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently online.
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Actions to be executed by the connectivity observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityAction {
    /// Start one drain pass of the sync queue.
    TriggerDrain,
    /// Emit an event to the application.
    EmitEvent(ConnectivityEvent),
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Transitioned from offline to online.
    WentOnline,
    /// Transitioned from online to offline.
    WentOffline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_offline() {
        let state = Connectivity::new();
        assert_eq!(state, Connectivity::Offline);
        assert!(!state.is_online());
    }

    #[test]
    fn going_online_triggers_drain() {
        let (state, actions) = Connectivity::Offline.on_signal(true);

        assert_eq!(state, Connectivity::Online);
        assert!(actions.contains(&ConnectivityAction::TriggerDrain));
        assert!(actions.contains(&ConnectivityAction::EmitEvent(ConnectivityEvent::WentOnline)));
    }

    #[test]
    fn going_offline_does_not_drain() {
        let (state, actions) = Connectivity::Online.on_signal(false);

        assert_eq!(state, Connectivity::Offline);
        assert!(!actions.contains(&ConnectivityAction::TriggerDrain));
        assert_eq!(
            actions,
            vec![ConnectivityAction::EmitEvent(ConnectivityEvent::WentOffline)]
        );
    }

    #[test]
    fn repeated_online_signal_is_ignored() {
        let (state, actions) = Connectivity::Online.on_signal(true);
        assert_eq!(state, Connectivity::Online);
        assert!(actions.is_empty());
    }

    #[test]
    fn repeated_offline_signal_is_ignored() {
        let (state, actions) = Connectivity::Offline.on_signal(false);
        assert_eq!(state, Connectivity::Offline);
        assert!(actions.is_empty());
    }

    #[test]
    fn flapping_drains_once_per_reconnect() {
        let mut state = Connectivity::new();
        let mut drains = 0;

        for signal in [true, true, false, false, true, false, true] {
            let (next, actions) = state.on_signal(signal);
            drains += actions
                .iter()
                .filter(|a| matches!(a, ConnectivityAction::TriggerDrain))
                .count();
            state = next;
        }

        assert_eq!(drains, 3);
    }
}
