//! Orchestration engine behaviour through the public handle.
//!
//! Every test runs the real engine task against the sandbox ledger and
//! inspects both the published snapshots and the ledger's call journal.

mod common;

use std::time::Duration;

use common::{assert_error_contains, assert_journal_order, settle, steps, wait_for, Harness};
use move_sequencer::core::ledger::JournalKind::{Evaluate, Submit};
use move_sequencer::core::ledger::{LocalSigner, SandboxLedger};
use move_sequencer::{
    Ack, BatchPlanner, EngineConfig, EngineError, EngineEvent, ExecutionMode, IgnoredReason,
    OrchestrationEngine, Phase,
};

// =============================================================================
// Partitioning
// =============================================================================

#[test]
fn partition_covers_every_step_in_order() {
    for size in 1..=7 {
        let planner = BatchPlanner::new(size).unwrap();
        for total in 1..=20 {
            let all = steps(total);
            let batches = planner.partition(&all);

            let flattened: Vec<_> = batches
                .iter()
                .flat_map(|batch| batch.steps(&all).iter().cloned())
                .collect();
            assert_eq!(flattened, all, "size={size} total={total}");

            for (i, batch) in batches.iter().enumerate() {
                assert!(!batch.is_empty());
                assert!(batch.len() <= size);
                if i + 1 < batches.len() {
                    assert_eq!(batch.len(), size, "only the last batch may be short");
                }
            }
        }
    }

    let lengths: Vec<usize> = BatchPlanner::new(5)
        .unwrap()
        .partition(&steps(12))
        .iter()
        .map(|batch| batch.len())
        .collect();
    assert_eq!(lengths, vec![5, 5, 2]);
}

// =============================================================================
// Manual operation
// =============================================================================

#[tokio::test]
async fn single_mode_manual_confirm() {
    let h = Harness::new();
    h.engine
        .configure(steps(2), ExecutionMode::Single, false)
        .await
        .unwrap();

    assert_eq!(h.engine.trigger_simulate().await, Ack::Accepted);
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.phase, Phase::AwaitingConfirmation);
    assert!(snapshot.pending_outcome.as_ref().unwrap().success);
    assert_eq!(snapshot.pending_steps, Some(0..1));

    assert_eq!(h.engine.confirm().await, Ack::Accepted);
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.cursor, 1);
    assert!(snapshot.pending_outcome.is_none());
    assert!(snapshot.last_error.is_none());

    assert_eq!(h.engine.trigger_simulate().await, Ack::Accepted);
    settle(&h.engine).await;
    assert_journal_order(
        &h.ledger,
        &[
            (Evaluate, &["call_0"]),
            (Submit, &["call_0"]),
            (Evaluate, &["call_1"]),
        ],
    );
}

#[tokio::test]
async fn trigger_while_busy_is_a_no_op() {
    let h = Harness::new();
    h.ledger.set_latency(Duration::from_millis(100));
    h.engine
        .configure(steps(2), ExecutionMode::Single, false)
        .await
        .unwrap();

    assert_eq!(h.engine.trigger_simulate().await, Ack::Accepted);
    let busy = h.engine.snapshot();
    assert!(busy.is_busy);
    assert_eq!(busy.phase, Phase::Simulating);

    assert_eq!(
        h.engine.trigger_simulate().await,
        Ack::Ignored(IgnoredReason::Busy)
    );
    assert_eq!(h.engine.confirm().await, Ack::Ignored(IgnoredReason::Busy));
    assert_eq!(h.engine.cancel().await, Ack::Ignored(IgnoredReason::Busy));
    assert_eq!(h.engine.snapshot().cursor, busy.cursor);

    settle(&h.engine).await;
    assert_eq!(h.ledger.evaluate_count(), 1);
    assert_eq!(h.ledger.submit_count(), 0);
}

#[tokio::test]
async fn cancel_discards_outcome_and_keeps_cursor() {
    let h = Harness::new();
    h.engine
        .configure(steps(2), ExecutionMode::Single, false)
        .await
        .unwrap();

    assert_eq!(
        h.engine.cancel().await,
        Ack::Ignored(IgnoredReason::NothingPending)
    );
    h.engine.trigger_simulate().await;
    settle(&h.engine).await;
    assert_eq!(h.engine.cancel().await, Ack::Accepted);

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.cursor, 0);
    assert!(snapshot.pending_outcome.is_none());
    assert_eq!(h.ledger.submit_count(), 0);
}

#[tokio::test]
async fn commands_before_configure_are_ignored() {
    let h = Harness::new();
    assert_eq!(
        h.engine.trigger_simulate().await,
        Ack::Ignored(IgnoredReason::NotConfigured)
    );
    assert!(!h.engine.snapshot().configured);
    assert!(matches!(
        h.engine.configure(vec![], ExecutionMode::Single, false).await,
        Err(EngineError::Configuration(_))
    ));
    assert!(!h.engine.snapshot().configured);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn submit_failure_leaves_cursor_unchanged() {
    let h = Harness::new();
    h.engine
        .configure(steps(3), ExecutionMode::Single, false)
        .await
        .unwrap();

    h.engine.trigger_simulate().await;
    settle(&h.engine).await;
    h.engine.confirm().await;
    assert_eq!(settle(&h.engine).await.cursor, 1);

    h.ledger.fail_next_submit("signer declined");
    h.engine.trigger_simulate().await;
    settle(&h.engine).await;
    h.engine.confirm().await;
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.cursor, 1);
    let error = snapshot.last_error.expect("submission error surfaced");
    assert_eq!(error.kind(), "submission");
    assert_error_contains(&error, "signer declined", "submit failure");

    // Retrying re-evaluates the same step.
    assert_eq!(h.engine.trigger_simulate().await, Ack::Accepted);
    let snapshot = settle(&h.engine).await;
    assert!(snapshot.last_error.is_none());
    assert_eq!(snapshot.pending_steps, Some(1..2));
    let last = h.ledger.journal().pop().unwrap();
    assert_eq!(last.kind, Evaluate);
    assert_eq!(last.functions(), vec!["call_1"]);
}

#[tokio::test]
async fn evaluation_failure_returns_to_idle() {
    let h = Harness::new();
    h.engine
        .configure(steps(2), ExecutionMode::Single, false)
        .await
        .unwrap();

    h.ledger.fail_next_evaluate("connection reset");
    h.engine.trigger_simulate().await;
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.phase, Phase::Idle);
    assert!(!snapshot.is_busy);
    assert_eq!(snapshot.cursor, 0);
    let error = snapshot.last_error.unwrap();
    assert_eq!(error.kind(), "evaluation");
    assert!(error.is_retryable());
    assert_error_contains(&error, "connection reset", "evaluate failure");
}

#[tokio::test]
async fn missing_signer_is_an_evaluation_error() {
    let ledger = std::sync::Arc::new(SandboxLedger::new());
    let signer = std::sync::Arc::new(LocalSigner::disconnected(ledger.clone()));
    let engine =
        OrchestrationEngine::spawn(common::fast_config(), ledger.clone(), signer.clone()).unwrap();
    engine
        .configure(steps(1), ExecutionMode::Single, false)
        .await
        .unwrap();

    engine.trigger_simulate().await;
    let snapshot = settle(&engine).await;
    assert_error_contains(
        snapshot.last_error.unwrap(),
        "no active signer",
        "disconnected signer",
    );
    assert_eq!(ledger.evaluate_count(), 0);

    signer.connect(common::identity());
    engine.trigger_simulate().await;
    assert_eq!(settle(&engine).await.phase, Phase::AwaitingConfirmation);
}

#[tokio::test]
async fn hung_call_times_out() {
    let config = common::fast_config().with_call_timeout(Some(Duration::from_millis(50)));
    let h = Harness::with_config(config);
    h.ledger.set_latency(Duration::from_millis(500));
    h.engine
        .configure(steps(1), ExecutionMode::Single, false)
        .await
        .unwrap();

    h.engine.trigger_simulate().await;
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_error_contains(snapshot.last_error.unwrap(), "timed out", "slow evaluate");
}

// =============================================================================
// Rejected simulations
// =============================================================================

#[tokio::test]
async fn rejected_simulation_requires_override() {
    let h = Harness::new();
    h.ledger
        .reject_function("0x2::seq::call_0", "MoveAbort(0x2::seq, 3)");
    h.engine
        .configure(steps(2), ExecutionMode::Single, true)
        .await
        .unwrap();

    h.engine.trigger_simulate().await;
    let snapshot = settle(&h.engine).await;
    // Auto-execute does not confirm a rejected outcome.
    assert_eq!(snapshot.phase, Phase::AwaitingConfirmation);
    assert!(!snapshot.pending_outcome.unwrap().success);
    assert_eq!(h.ledger.submit_count(), 0);

    assert_eq!(
        h.engine.confirm().await,
        Ack::Ignored(IgnoredReason::RequiresOverride)
    );
    assert_eq!(h.engine.current_phase(), Phase::AwaitingConfirmation);

    h.ledger.clear_rejections();
    assert_eq!(h.engine.force_confirm().await, Ack::Accepted);
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.phase, Phase::Completed);
    assert_eq!(h.ledger.submit_count(), 2);
}

#[tokio::test]
async fn forced_submit_can_still_abort() {
    let h = Harness::new();
    h.ledger.reject_function("0x2::seq::call_0", "E_PAUSED");
    h.engine
        .configure(steps(1), ExecutionMode::Single, false)
        .await
        .unwrap();

    h.engine.trigger_simulate().await;
    settle(&h.engine).await;
    h.engine.force_confirm().await;
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.cursor, 0);
    let error = snapshot.last_error.unwrap();
    assert_eq!(error.kind(), "submission");
    assert_error_contains(&error, "transaction aborted", "forced submit");
}

// =============================================================================
// Completion and auto-execute
// =============================================================================

#[tokio::test]
async fn completion_is_terminal() {
    let h = Harness::new();
    h.engine
        .configure(steps(1), ExecutionMode::Single, false)
        .await
        .unwrap();

    h.engine.trigger_simulate().await;
    settle(&h.engine).await;
    h.engine.confirm().await;
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.phase, Phase::Completed);
    assert!(snapshot.phase.is_terminal());
    assert_eq!(snapshot.cursor, snapshot.total_steps);

    assert_eq!(
        h.engine.trigger_simulate().await,
        Ack::Ignored(IgnoredReason::Completed)
    );
    assert_eq!(h.ledger.evaluate_count(), 1);
}

#[tokio::test]
async fn auto_execute_chains_to_completion() {
    let h = Harness::new();
    let mut events = h.engine.subscribe();
    h.engine
        .configure(steps(3), ExecutionMode::Single, true)
        .await
        .unwrap();

    assert_eq!(h.engine.trigger_simulate().await, Ack::Accepted);
    let snapshot = wait_for(&h.engine, |s| s.phase.is_terminal()).await;
    assert_eq!(snapshot.cursor, 3);

    assert_journal_order(
        &h.ledger,
        &[
            (Evaluate, &["call_0"]),
            (Submit, &["call_0"]),
            (Evaluate, &["call_1"]),
            (Submit, &["call_1"]),
            (Evaluate, &["call_2"]),
            (Submit, &["call_2"]),
        ],
    );

    let mut executed = Vec::new();
    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::Executed { record, .. } => executed.push(record.step_range),
            EngineEvent::Completed { total_steps } => {
                assert_eq!(total_steps, 3);
                completed = true;
            }
            _ => {}
        }
    }
    assert_eq!(executed, vec![0..1, 1..2, 2..3]);
    assert!(completed);
}

#[tokio::test]
async fn auto_execute_halts_on_submit_failure() {
    let config = common::fast_config().with_settle_delay(Duration::from_millis(100));
    let h = Harness::with_config(config);
    h.engine
        .configure(steps(3), ExecutionMode::Single, true)
        .await
        .unwrap();

    h.engine.trigger_simulate().await;
    wait_for(&h.engine, |s| s.cursor == 1).await;
    h.ledger.fail_next_submit("broadcast rejected");
    let snapshot = wait_for(&h.engine, |s| s.is_settled() && s.last_error.is_some()).await;
    assert_eq!(snapshot.cursor, 1);
    assert_eq!(snapshot.phase, Phase::Idle);

    // No automatic retry.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.ledger.submit_count(), 2);
    assert_eq!(h.engine.snapshot().cursor, 1);

    // A manual trigger resumes the chain from the failed step.
    h.engine.trigger_simulate().await;
    let snapshot = wait_for(&h.engine, |s| s.phase.is_terminal()).await;
    assert_eq!(snapshot.cursor, 3);
}

#[tokio::test]
async fn disabling_auto_execute_cancels_scheduled_trigger() {
    let config = common::fast_config().with_settle_delay(Duration::from_millis(200));
    let h = Harness::with_config(config);
    h.engine
        .configure(steps(3), ExecutionMode::Single, true)
        .await
        .unwrap();

    h.engine.trigger_simulate().await;
    let snapshot = wait_for(&h.engine, |s| s.next_trigger_scheduled).await;
    assert_eq!(snapshot.cursor, 1);

    assert_eq!(h.engine.set_auto_execute(false).await, Ack::Accepted);
    let snapshot = h.engine.snapshot();
    assert!(!snapshot.next_trigger_scheduled);
    assert!(!snapshot.auto_execute);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.ledger.evaluate_count(), 1);
    assert_eq!(h.engine.snapshot().phase, Phase::Idle);
}

#[tokio::test]
async fn cursor_never_moves_backwards() {
    let h = Harness::new();
    let mut watch = h.engine.watch();
    h.engine
        .configure(steps(6), ExecutionMode::Single, true)
        .await
        .unwrap();

    let observer = tokio::spawn(async move {
        let mut seen = vec![watch.borrow_and_update().cursor];
        while watch.changed().await.is_ok() {
            let snapshot = watch.borrow_and_update().clone();
            seen.push(snapshot.cursor);
            if snapshot.phase.is_terminal() {
                break;
            }
        }
        seen
    });

    h.ledger.fail_next_submit("nonce too low");
    h.engine.trigger_simulate().await;
    wait_for(&h.engine, |s| s.is_settled() && s.last_error.is_some()).await;
    h.engine.trigger_simulate().await;
    wait_for(&h.engine, |s| s.phase.is_terminal()).await;

    let seen = tokio::time::timeout(common::WAIT, observer)
        .await
        .unwrap()
        .unwrap();
    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{seen:?}");
    assert_eq!(seen.last(), Some(&6));
}

// =============================================================================
// Batch mode
// =============================================================================

#[tokio::test]
async fn batch_mode_partial_batch() {
    let h = Harness::new();
    h.engine
        .configure(steps(7), ExecutionMode::Batch, false)
        .await
        .unwrap();
    assert_eq!(h.engine.snapshot().total_batches, 2);

    h.engine.trigger_simulate().await;
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.pending_steps, Some(0..5));
    h.engine.confirm().await;
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.cursor, 5);
    assert_eq!(snapshot.batch_cursor, 1);
    assert_eq!(snapshot.current_unit_index(), 1);

    h.engine.trigger_simulate().await;
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.pending_steps, Some(5..7));
    h.engine.confirm().await;
    let snapshot = settle(&h.engine).await;
    assert_eq!(snapshot.cursor, 7);
    assert_eq!(snapshot.phase, Phase::Completed);

    let journal = h.ledger.journal();
    assert_eq!(journal.len(), 4);
    assert_eq!(journal[0].payload.call_count(), 5);
    assert_eq!(journal[2].payload.call_count(), 2);
    assert_eq!(
        journal[3].functions(),
        vec!["call_5".to_string(), "call_6".to_string()]
    );
}

#[tokio::test]
async fn batch_auto_execute_with_explorer_links() {
    let config = common::fast_config()
        .with_batch_size(2)
        .with_explorer_url(Some("https://explorer.example/".to_string()));
    let h = Harness::with_config(config);
    h.engine
        .configure(steps(5), ExecutionMode::Batch, true)
        .await
        .unwrap();

    h.engine.trigger_simulate().await;
    let snapshot = wait_for(&h.engine, |s| s.phase.is_terminal()).await;
    assert_eq!(snapshot.batch_cursor, 3);
    assert_eq!(h.ledger.submit_count(), 3);

    let record = snapshot.last_execution.unwrap();
    assert_eq!(record.step_range, 4..5);
    let link = record.explorer_link.unwrap();
    assert!(link.starts_with("https://explorer.example/txblock/0x"));
    assert_eq!(link.len(), "https://explorer.example/txblock/".len() + 66);
}

#[tokio::test]
async fn mode_switch_requires_batch_boundary() {
    let h = Harness::new();
    h.engine
        .configure(steps(12), ExecutionMode::Single, false)
        .await
        .unwrap();

    for _ in 0..2 {
        h.engine.trigger_simulate().await;
        settle(&h.engine).await;
        h.engine.confirm().await;
        settle(&h.engine).await;
    }
    let err = h.engine.set_mode(ExecutionMode::Batch).await.unwrap_err();
    assert_eq!(err.kind(), "configuration");
    assert_eq!(h.engine.snapshot().mode, ExecutionMode::Single);

    for _ in 0..3 {
        h.engine.trigger_simulate().await;
        settle(&h.engine).await;
        h.engine.confirm().await;
        settle(&h.engine).await;
    }
    h.engine.set_mode(ExecutionMode::Batch).await.unwrap();
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.cursor, 5);
    assert_eq!(snapshot.batch_cursor, 1);

    h.engine.trigger_simulate().await;
    assert_eq!(settle(&h.engine).await.pending_steps, Some(5..10));
    assert!(h.engine.set_mode(ExecutionMode::Single).await.is_err());
}

// =============================================================================
// Reconfiguration
// =============================================================================

#[tokio::test]
async fn configure_is_refused_while_busy() {
    let h = Harness::new();
    h.ledger.set_latency(Duration::from_millis(100));
    h.engine
        .configure(steps(2), ExecutionMode::Single, false)
        .await
        .unwrap();
    h.engine.trigger_simulate().await;

    let err = h
        .engine
        .configure(steps(4), ExecutionMode::Single, false)
        .await
        .unwrap_err();
    assert_error_contains(err, "in flight", "reconfigure while busy");
    assert_eq!(h.engine.snapshot().total_steps, 2);
}

#[tokio::test]
async fn reconfigure_drops_scheduled_trigger() {
    let config = common::fast_config().with_settle_delay(Duration::from_millis(200));
    let h = Harness::with_config(config);
    h.engine
        .configure(steps(3), ExecutionMode::Single, true)
        .await
        .unwrap();
    h.engine.trigger_simulate().await;
    let before = wait_for(&h.engine, |s| s.next_trigger_scheduled).await;

    h.engine
        .configure(steps(4), ExecutionMode::Batch, false)
        .await
        .unwrap();
    let after = h.engine.snapshot();
    assert_eq!(after.generation, before.generation + 1);
    assert_eq!(after.cursor, 0);
    assert_eq!(after.total_steps, 4);
    assert!(!after.next_trigger_scheduled);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.ledger.evaluate_count(), 1);
    assert_eq!(h.engine.snapshot().phase, Phase::Idle);
}

#[tokio::test]
async fn invalid_config_is_rejected_at_spawn() {
    let ledger = std::sync::Arc::new(SandboxLedger::new());
    let signer = std::sync::Arc::new(LocalSigner::new(common::identity(), ledger.clone()));
    let result = OrchestrationEngine::spawn(
        EngineConfig::default().with_batch_size(0),
        ledger,
        signer,
    );
    assert!(matches!(result, Err(EngineError::Configuration(_))));
}

#[tokio::test]
async fn shutdown_stops_the_engine() {
    let h = Harness::new();
    h.engine.shutdown().await;
    tokio::time::timeout(common::WAIT, async {
        while !h.engine.is_stopped() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(
        h.engine.trigger_simulate().await,
        Ack::Ignored(IgnoredReason::Stopped)
    );
}
