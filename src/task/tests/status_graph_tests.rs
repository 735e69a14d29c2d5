//! Unit tests for the declared task transition graph.

use crate::task::domain::{Phase, SideEffect, TaskStatus};
use rstest::rstest;

const ALL_STATUSES: [TaskStatus; 8] = [
    TaskStatus::Backlog,
    TaskStatus::Analysis,
    TaskStatus::InProgress,
    TaskStatus::Testing,
    TaskStatus::CodeReview,
    TaskStatus::Blocked,
    TaskStatus::Done,
    TaskStatus::Cancelled,
];

/// The declared edge list, used as the oracle for the random walk below.
fn declared_edges(from: TaskStatus) -> Vec<TaskStatus> {
    match from {
        TaskStatus::Backlog => vec![
            TaskStatus::Analysis,
            TaskStatus::Blocked,
            TaskStatus::Cancelled,
        ],
        TaskStatus::Analysis => vec![
            TaskStatus::Backlog,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Cancelled,
        ],
        TaskStatus::InProgress => vec![
            TaskStatus::Analysis,
            TaskStatus::Testing,
            TaskStatus::Blocked,
            TaskStatus::Cancelled,
        ],
        TaskStatus::Testing => vec![
            TaskStatus::InProgress,
            TaskStatus::CodeReview,
            TaskStatus::Blocked,
            TaskStatus::Cancelled,
        ],
        TaskStatus::CodeReview => vec![
            TaskStatus::InProgress,
            TaskStatus::Testing,
            TaskStatus::Blocked,
            TaskStatus::Done,
            TaskStatus::Cancelled,
        ],
        TaskStatus::Blocked => vec![
            TaskStatus::Backlog,
            TaskStatus::Analysis,
            TaskStatus::InProgress,
            TaskStatus::Testing,
            TaskStatus::CodeReview,
            TaskStatus::Cancelled,
        ],
        TaskStatus::Done | TaskStatus::Cancelled => Vec::new(),
    }
}

#[rstest]
#[case(TaskStatus::Backlog)]
#[case(TaskStatus::Analysis)]
#[case(TaskStatus::InProgress)]
#[case(TaskStatus::Testing)]
#[case(TaskStatus::CodeReview)]
#[case(TaskStatus::Blocked)]
#[case(TaskStatus::Done)]
#[case(TaskStatus::Cancelled)]
fn graph_matches_declared_edges(#[case] from: TaskStatus) {
    let expected = declared_edges(from);
    for target in ALL_STATUSES {
        assert_eq!(
            from.can_transition_to(target),
            expected.contains(&target),
            "edge {from} -> {target}"
        );
    }
    assert_eq!(from.allowed_successors(), expected);
}

#[rstest]
#[case(TaskStatus::Done)]
#[case(TaskStatus::Cancelled)]
fn terminal_statuses_have_no_edges(#[case] terminal: TaskStatus) {
    assert!(terminal.is_terminal());
    assert!(terminal.allowed_successors().is_empty());
}

#[test]
fn self_edges_are_never_legal() {
    for status in ALL_STATUSES {
        assert!(!status.can_transition_to(status), "self edge on {status}");
    }
}

/// Deterministic random walk over the graph: from every visited status,
/// attempted targets are accepted exactly when the oracle lists them.
#[test]
fn random_walk_accepts_only_declared_edges() {
    // Small deterministic LCG (Numerical Recipes constants) so the walk is
    // reproducible without a randomness dependency.
    let mut seed: u64 = 0x5eed_cafe;
    let mut next = move || {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        usize::try_from((seed >> 33) % 8).unwrap_or(0)
    };

    let mut current = TaskStatus::Backlog;
    let mut accepted_edges = 0_u32;
    for _ in 0..10_000 {
        let target = ALL_STATUSES
            .get(next())
            .copied()
            .unwrap_or(TaskStatus::Backlog);
        let legal = declared_edges(current).contains(&target);
        assert_eq!(current.can_transition_to(target), legal);
        if legal {
            accepted_edges += 1;
            current = target;
        }
        if current.is_terminal() {
            current = TaskStatus::Backlog;
        }
    }
    assert!(accepted_edges > 0, "walk never moved");
}

#[test]
fn phase_status_round_trips() {
    for phase in [
        Phase::Analysis,
        Phase::Implementation,
        Phase::Testing,
        Phase::Review,
    ] {
        assert_eq!(phase.status().phase(), Some(phase));
    }
}

#[test]
fn entry_effects_cover_cleanup_on_terminal_statuses() {
    assert!(
        TaskStatus::Done
            .entry_effects()
            .contains(&SideEffect::ReleaseResources)
    );
    assert!(
        TaskStatus::Cancelled
            .entry_effects()
            .contains(&SideEffect::RemoveWorkspace)
    );
    assert!(
        TaskStatus::Blocked
            .entry_effects()
            .contains(&SideEffect::StopSession)
    );
}

#[test]
fn status_strings_round_trip() {
    for status in ALL_STATUSES {
        assert_eq!(TaskStatus::try_from(status.as_str()), Ok(status));
    }
    assert!(TaskStatus::try_from("galaxy-brain").is_err());
}
