//! Settler state definitions.

/// Settler operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlerState {
    /// Settler is starting up.
    Starting,
    /// Settler is running and accepting trades.
    Running,
    /// Settler is draining in-flight trades, not accepting new ones.
    ShuttingDown,
    /// Settler is stopped.
    Stopped,
}

impl SettlerState {
    /// Check if the settler is accepting new trades.
    pub fn accepts_trades(&self) -> bool {
        matches!(self, SettlerState::Running)
    }

    /// Check if the settler is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlerState::Stopped)
    }
}
