use super::*;
use crate::{artifacts::store::MemoryArtifactStore, panel::capability::TransientKind};

fn no_backoff(retries: u32) -> FeedbackConfig {
    FeedbackConfig {
        max_transient_retries: retries,
        retry_backoff_ms: 0,
        ..FeedbackConfig::default()
    }
}

fn step(request: &Value) -> StepContext<'_> {
    StepContext {
        session_id: "s",
        capability: GENERATOR,
        iteration: 2,
        request,
    }
}

#[test]
fn rejected_feedback_is_never_blank() {
    assert_eq!(
        normalize_feedback(Verdict::Rejected, Some("  too dark \n".into())).as_deref(),
        Some("too dark")
    );
    assert_eq!(
        normalize_feedback(Verdict::Rejected, Some("   ".into())).as_deref(),
        Some(MISSING_FEEDBACK)
    );
    assert_eq!(
        normalize_feedback(Verdict::Rejected, None).as_deref(),
        Some(MISSING_FEEDBACK)
    );
    assert_eq!(normalize_feedback(Verdict::Accepted, Some("nice".into())), None);
}

#[test]
fn terminal_states() {
    assert!(!SessionState::Init.is_terminal());
    assert!(!SessionState::Generating { iteration: 1 }.is_terminal());
    assert!(!SessionState::Critiquing { iteration: 1 }.is_terminal());
    assert!(SessionState::Accepted.is_terminal());
    assert!(SessionState::Exhausted.is_terminal());
    assert!(SessionState::Cancelled.is_terminal());
    assert!(SessionState::Failed.is_terminal());
}

#[test]
fn transient_failures_are_retried_and_logged() {
    let mut sink = MemoryArtifactStore::new();
    let req = json!({ "k": 1 });
    let mut calls = Vec::new();

    let out = run_step(
        &mut sink,
        &no_backoff(3),
        step(&req),
        |attempt| {
            calls.push(attempt);
            if attempt < 3 {
                Err(CapabilityError::rate_limited("slow down"))
            } else {
                Ok(7u32)
            }
        },
        |v| json!(v),
    )
    .unwrap();

    assert_eq!(out, 7);
    assert_eq!(calls, vec![1, 2, 3]);
    let outcomes: Vec<_> = sink.steps.iter().map(|s| s.outcome).collect();
    assert_eq!(
        outcomes,
        vec![StepOutcome::Transient, StepOutcome::Transient, StepOutcome::Ok]
    );
    assert!(sink.steps.iter().all(|s| s.iteration == 2));
    assert_eq!(sink.steps[2].step, "generator_iter2_attempt3");
    assert_eq!(sink.steps[2].response, Some(json!(7)));
}

#[test]
fn retry_budget_escalates_to_transient_error() {
    let mut sink = MemoryArtifactStore::new();
    let req = json!({});
    let err = run_step(
        &mut sink,
        &no_backoff(2),
        step(&req),
        |_| -> Result<(), _> {
            Err(CapabilityError::Transient {
                kind: TransientKind::Timeout,
                message: "deadline".into(),
            })
        },
        |_| Value::Null,
    )
    .unwrap_err();

    match err {
        ForgeError::TransientCapability {
            capability,
            attempts,
            message,
        } => {
            assert_eq!(capability, GENERATOR);
            assert_eq!(attempts, 3);
            assert_eq!(message, "deadline");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sink.steps.len(), 3);
}

#[test]
fn policy_and_fatal_failures_are_not_retried() {
    let mut sink = MemoryArtifactStore::new();
    let req = json!({});
    let mut calls = 0;
    let err = run_step(
        &mut sink,
        &no_backoff(3),
        step(&req),
        |_| -> Result<(), _> {
            calls += 1;
            Err(CapabilityError::policy("refused"))
        },
        |_| Value::Null,
    )
    .unwrap_err();
    assert!(matches!(err, ForgeError::PolicyViolation { .. }));
    assert_eq!(calls, 1);
    assert_eq!(sink.steps[0].outcome, StepOutcome::PolicyViolation);
    assert_eq!(sink.steps[0].error.as_deref(), Some("content policy violation: refused"));

    let err = run_step(
        &mut sink,
        &no_backoff(3),
        step(&req),
        |_| -> Result<(), _> { Err(CapabilityError::fatal("garbled")) },
        |_| Value::Null,
    )
    .unwrap_err();
    assert!(matches!(err, ForgeError::Capability { .. }));
    assert_eq!(sink.steps[1].outcome, StepOutcome::Error);
}

#[test]
fn broken_step_log_does_not_mask_the_call_result() {
    let mut sink = MemoryArtifactStore {
        fail_step_writes: true,
        ..Default::default()
    };
    let req = json!({});
    let out = run_step(&mut sink, &no_backoff(0), step(&req), |_| Ok(1u8), |_| Value::Null);
    assert_eq!(out.unwrap(), 1);

    let err = run_step(
        &mut sink,
        &no_backoff(0),
        step(&req),
        |_| -> Result<(), _> { Err(CapabilityError::policy("nope")) },
        |_| Value::Null,
    )
    .unwrap_err();
    assert!(matches!(err, ForgeError::PolicyViolation { .. }));
}
