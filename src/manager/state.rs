use std::fmt;

/// Lifecycle of a token manager. Moves only forward: NotStarted → Running → Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerState {
    NotStarted,
    Running,
    Stopped,
}

impl ManagerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerState::NotStarted => "not started",
            ManagerState::Running => "running",
            ManagerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
