use crate::model::task::TaskStatus;

/// Whether a task may move from `from` to `to`.
///
/// Forward moves are always allowed; going back is limited to
/// `in_progress -> pending` and reopening a completed task.
pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    matches!(
        (from, to),
        (Pending, InProgress)
            | (Pending, Completed)
            | (InProgress, Completed)
            | (InProgress, Pending)
            | (Completed, InProgress)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskStatus::*;

    #[test]
    fn forward_moves_allowed() {
        assert!(can_transition(Pending, InProgress));
        assert!(can_transition(InProgress, Completed));
        assert!(can_transition(Pending, Completed));
    }

    #[test]
    fn reopen_and_pause_allowed() {
        assert!(can_transition(Completed, InProgress));
        assert!(can_transition(InProgress, Pending));
    }

    #[test]
    fn same_status_and_reset_rejected() {
        assert!(!can_transition(Pending, Pending));
        assert!(!can_transition(Completed, Completed));
        assert!(!can_transition(Completed, Pending));
    }
}
