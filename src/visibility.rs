//! # Visibility Gate
//!
//! Foreground/background signal for the hosting surface. The host wires its
//! own visibility events (a browser `visibilitychange` equivalent) into
//! [`VisibilityGate::set_visible`]; registrations that opt in via
//! `pause_on_hidden` are suspended while hidden and resumed on return to the
//! foreground.
//!
//! In environments with no visibility signal (server-side tests, headless
//! hosts) the gate defaults to visible, so scheduling behaves as if always
//! foregrounded.

use crate::constants::events;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Cloneable handle to the shared visibility state.
#[derive(Debug, Clone)]
pub struct VisibilityGate {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for VisibilityGate {
    fn default() -> Self {
        let (sender, _) = watch::channel(true);
        Self {
            sender: Arc::new(sender),
        }
    }
}

impl VisibilityGate {
    /// Gate starting in the visible state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visibility transition from the host. Redundant updates are
    /// dropped so subscribers only wake on real transitions.
    pub fn set_visible(&self, visible: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
        if changed {
            info!(
                event = events::VISIBILITY_CHANGED,
                visible = visible,
                "Host visibility changed"
            );
        }
    }

    pub fn is_visible(&self) -> bool {
        *self.sender.borrow()
    }

    /// Watch receiver for schedule loops; resolves on every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_visible() {
        let gate = VisibilityGate::new();
        assert!(gate.is_visible());
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let gate = VisibilityGate::new();
        let mut rx = gate.subscribe();

        gate.set_visible(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());

        gate.set_visible(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn test_redundant_updates_are_dropped() {
        let gate = VisibilityGate::new();
        let rx = gate.subscribe();

        gate.set_visible(true);
        assert!(!rx.has_changed().unwrap());

        gate.set_visible(false);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_clones_share_state() {
        let gate = VisibilityGate::new();
        let clone = gate.clone();

        clone.set_visible(false);
        assert!(!gate.is_visible());
    }
}
