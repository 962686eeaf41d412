use std::fmt;

/// Lifecycle of one deployment run.
///
/// `Closed` and `Failed` are terminal; nothing moves a run out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Validating,
    Connecting,
    Uploading,
    Sequencing,
    /// Every command was sent; remote output keeps flowing until closed
    Streaming,
    Closed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Closed | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Validating => "validating",
            RunState::Connecting => "connecting",
            RunState::Uploading => "uploading",
            RunState::Sequencing => "sequencing",
            RunState::Streaming => "streaming",
            RunState::Closed => "closed",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}
