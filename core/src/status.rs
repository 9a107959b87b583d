use serde::{Deserialize, Serialize};

/// Where a task chain is in its run.
///
/// `Idle(0) -> Running(0) -> Settled(0) -> Running(1) -> ... -> Done`.
/// `Failed` and `Aborted` are terminal and carry the index of the task that
/// was current when the chain stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainStatus {
    /// Built, first task not yet started
    Idle(usize),
    Running(usize),
    /// Task completed; the next one has not started yet
    Settled(usize),
    Failed(usize),
    /// Disposed before completing
    Aborted(usize),
    Done,
}

impl ChainStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChainStatus::Failed(_) | ChainStatus::Aborted(_) | ChainStatus::Done
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ChainStatus::Running(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ChainStatus::Failed(_))
    }

    /// Task index this status refers to, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            ChainStatus::Idle(i)
            | ChainStatus::Running(i)
            | ChainStatus::Settled(i)
            | ChainStatus::Failed(i)
            | ChainStatus::Aborted(i) => Some(*i),
            ChainStatus::Done => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChainStatus::Idle(_) => "idle",
            ChainStatus::Running(_) => "running",
            ChainStatus::Settled(_) => "settled",
            ChainStatus::Failed(_) => "failed",
            ChainStatus::Aborted(_) => "aborted",
            ChainStatus::Done => "done",
        }
    }
}

/// Per-task record kept by a chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Pending,
    Fulfilled,
    Rejected,
    /// Never ran because an earlier task failed or the chain was disposed
    Aborted,
}

impl TaskState {
    pub fn is_settled(&self) -> bool {
        matches!(self, TaskState::Fulfilled | TaskState::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ChainStatus::Idle(0).is_terminal());
        assert!(!ChainStatus::Running(1).is_terminal());
        assert!(!ChainStatus::Settled(1).is_terminal());
        assert!(ChainStatus::Failed(0).is_terminal());
        assert!(ChainStatus::Aborted(2).is_terminal());
        assert!(ChainStatus::Done.is_terminal());
    }

    #[test]
    fn test_index() {
        assert_eq!(ChainStatus::Failed(3).index(), Some(3));
        assert_eq!(ChainStatus::Done.index(), None);
    }

    #[test]
    fn test_task_state_serializes_lowercase() {
        let json = serde_json::to_string(&[TaskState::Fulfilled, TaskState::Aborted]).unwrap();
        assert_eq!(json, r#"["fulfilled","aborted"]"#);
    }
}
