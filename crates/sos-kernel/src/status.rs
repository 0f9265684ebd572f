//! Bundle lifecycle state machine.

use std::fmt;

/// Lifecycle states. `Downloading` and `Updating` exist for external
/// orchestrators; the kernel itself never enters them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleStatus {
    Installed,
    Starting,
    Started,
    Stopping,
    Stopped,
    Downloading,
    Updating,
    Failed,
}

impl fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BundleStatus::Installed => "INSTALLED",
            BundleStatus::Starting => "STARTING",
            BundleStatus::Started => "STARTED",
            BundleStatus::Stopping => "STOPPING",
            BundleStatus::Stopped => "STOPPED",
            BundleStatus::Downloading => "DOWNLOADING",
            BundleStatus::Updating => "UPDATING",
            BundleStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

impl BundleStatus {
    /// Legal edges of the state machine. `Failed` and `Stopped` are
    /// terminal; `Failed` is reachable from every in-progress state.
    pub fn can_transition(self, to: BundleStatus) -> bool {
        use BundleStatus::*;
        matches!(
            (self, to),
            (Installed, Starting)
                | (Starting, Started)
                | (Installed | Starting | Started, Stopping)
                | (Stopping, Stopped)
                | (Downloading | Updating, Installed)
                | (Installed | Starting | Started | Stopping | Downloading | Updating, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BundleStatus::Stopped | BundleStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BundleStatus::*;

    #[test]
    fn happy_path_is_legal() {
        assert!(Installed.can_transition(Starting));
        assert!(Starting.can_transition(Started));
        assert!(Started.can_transition(Stopping));
        assert!(Stopping.can_transition(Stopped));
    }

    #[test]
    fn failed_is_reachable_from_in_progress_states() {
        for from in [Installed, Starting, Started, Stopping] {
            assert!(from.can_transition(Failed), "{from} -> FAILED");
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in [
            Installed, Starting, Started, Stopping, Stopped, Downloading, Updating, Failed,
        ] {
            assert!(!Stopped.can_transition(to), "STOPPED -> {to}");
            assert!(!Failed.can_transition(to), "FAILED -> {to}");
        }
    }

    #[test]
    fn stopped_bundles_cannot_restart() {
        assert!(!Stopped.can_transition(Starting));
        assert!(!Stopped.can_transition(Installed));
    }
}
