//! Sequence run-loop and report generation.
//!
//! `run_sequence` configures an engine with a [`SequenceSpec`], keeps it
//! moving until the sequence completes or stops, and collects one
//! [`UnitReport`] per simulated unit from the engine's event stream. The
//! engine decides pacing: with auto-execute the loop mostly waits, without
//! it the loop re-triggers after every committed unit. Whenever a simulation
//! outcome is pending, the [`ConfirmDecider`] is asked what to do with it.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Instant;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};

use sequencer_types::SimulationOutcome;

use crate::engine::{EngineEvent, EngineHandle};
use crate::sequence::SequenceSpec;
use crate::state::{Ack, ExecutionMode, IgnoredReason, Phase};

/// What to do with a pending simulation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirm,
    /// Execute even though the simulation was rejected.
    ForceConfirm,
    Cancel,
}

/// The unit whose outcome awaits a decision.
#[derive(Debug, Clone)]
pub struct PendingUnit {
    pub step_range: Range<usize>,
    pub titles: Vec<String>,
}

#[async_trait::async_trait]
pub trait ConfirmDecider: Send + Sync {
    async fn decide(&self, unit: &PendingUnit, outcome: &SimulationOutcome) -> Decision;
}

/// Confirms successful simulations. Rejected ones are force-confirmed when
/// `force_rejected` is set and cancelled otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDecider {
    pub force_rejected: bool,
}

#[async_trait::async_trait]
impl ConfirmDecider for AutoDecider {
    async fn decide(&self, _unit: &PendingUnit, outcome: &SimulationOutcome) -> Decision {
        match (outcome.success, self.force_rejected) {
            (true, _) => Decision::Confirm,
            (false, true) => Decision::ForceConfirm,
            (false, false) => Decision::Cancel,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UnitReport {
    pub label: String,
    pub step_range: Range<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_estimate: Option<String>,
    #[serde(default)]
    pub forced: bool,
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl UnitReport {
    fn new(label: String, step_range: Range<usize>) -> Self {
        Self {
            label,
            step_range,
            simulation_success: None,
            simulation_status: None,
            gas_estimate: None,
            forced: false,
            committed: false,
            transaction_id: None,
            explorer_link: None,
            error: None,
            elapsed_ms: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SequenceRunReport {
    pub run_id: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub mode: ExecutionMode,
    pub auto_execute: bool,
    pub total_steps: usize,
    pub committed_steps: usize,
    pub completed: bool,
    pub stopped_early: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    pub elapsed_ms: u128,
    pub units: Vec<UnitReport>,
}

impl SequenceRunReport {
    pub fn committed_units(&self) -> usize {
        self.units.iter().filter(|unit| unit.committed).count()
    }
}

/// Drive `sequence` to completion or to the first unrecovered stop.
///
/// The engine is (re)configured with the sequence's steps, mode and auto-execute
/// flag. Errors are returned only for problems with the engine itself;
/// evaluation and submission failures end the run with `stopped_early` set.
pub async fn run_sequence(
    handle: &EngineHandle,
    sequence: &SequenceSpec,
    decider: &dyn ConfirmDecider,
) -> Result<SequenceRunReport> {
    let started = Instant::now();
    let started_at = chrono::Utc::now().to_rfc3339();
    let run_id = uuid::Uuid::new_v4().to_string();

    let mut events = handle.subscribe();
    handle
        .configure(sequence.steps.clone(), sequence.mode, sequence.auto_execute)
        .await?;
    info!(
        run_id = %run_id,
        sequence = sequence.display_name(),
        steps = sequence.steps.len(),
        "running sequence"
    );

    let mut units: Vec<UnitReport> = Vec::new();
    let mut stop_reason = None;

    loop {
        let snapshot = handle.wait_until(|s| s.is_settled()).await;
        drain_events(&mut events, &mut units);

        if handle.is_stopped() && !snapshot.phase.is_terminal() {
            bail!("engine stopped before the sequence finished");
        }

        match snapshot.phase {
            Phase::Completed => break,
            Phase::AwaitingConfirmation => {
                let (Some(outcome), Some(step_range)) =
                    (snapshot.pending_outcome, snapshot.pending_steps)
                else {
                    bail!("engine is awaiting confirmation without a pending outcome");
                };
                let pending = PendingUnit {
                    titles: sequence.steps[step_range.clone()]
                        .iter()
                        .map(|step| step.title.clone())
                        .collect(),
                    step_range,
                };

                let decision = decider.decide(&pending, &outcome).await;
                let ack = match decision {
                    Decision::Confirm => handle.confirm().await,
                    Decision::ForceConfirm => {
                        if let Some(unit) = units.last_mut() {
                            unit.forced = true;
                        }
                        handle.force_confirm().await
                    }
                    Decision::Cancel => {
                        handle.cancel().await;
                        stop_reason = Some(format!(
                            "cancelled at steps {}-{}: {}",
                            pending.step_range.start + 1,
                            pending.step_range.end,
                            outcome.status_message
                        ));
                        break;
                    }
                };
                if let Ack::Ignored(reason) = ack {
                    stop_reason = Some(match reason {
                        IgnoredReason::RequiresOverride => format!(
                            "simulation rejected: {}",
                            outcome.status_message
                        ),
                        other => format!("confirmation ignored: {other}"),
                    });
                    break;
                }
            }
            Phase::Idle => {
                if let Some(error) = snapshot.last_error {
                    stop_reason = Some(error.to_string());
                    break;
                }
                if let Ack::Ignored(reason) = handle.trigger_simulate().await {
                    bail!("engine refused to simulate: {reason}");
                }
            }
            Phase::Simulating | Phase::Executing => {}
        }
    }

    let snapshot = handle.snapshot();
    drain_events(&mut events, &mut units);
    let completed = snapshot.phase.is_terminal();
    if let Some(reason) = &stop_reason {
        warn!(run_id = %run_id, cursor = snapshot.cursor, reason = %reason, "sequence stopped");
    } else {
        info!(run_id = %run_id, steps = snapshot.total_steps, "sequence finished");
    }

    Ok(SequenceRunReport {
        run_id,
        started_at,
        name: sequence.name.clone(),
        mode: snapshot.mode,
        auto_execute: snapshot.auto_execute,
        total_steps: snapshot.total_steps,
        committed_steps: snapshot.cursor,
        completed,
        stopped_early: !completed,
        stop_reason,
        elapsed_ms: started.elapsed().as_millis(),
        units,
    })
}

fn drain_events(events: &mut broadcast::Receiver<EngineEvent>, units: &mut Vec<UnitReport>) {
    loop {
        match events.try_recv() {
            Ok(event) => apply_event(event, units),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "run report missed engine events");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

fn apply_event(event: EngineEvent, units: &mut Vec<UnitReport>) {
    match event {
        EngineEvent::Simulated {
            unit,
            step_range,
            outcome,
        } => {
            let mut report = UnitReport::new(unit, step_range);
            report.simulation_success = Some(outcome.success);
            report.simulation_status = Some(outcome.status_message);
            report.gas_estimate = Some(outcome.gas_estimate);
            units.push(report);
        }
        EngineEvent::Executed { record, elapsed_ms } => {
            let report = open_report(units, &record.label, record.step_range.clone());
            report.committed = true;
            report.transaction_id = Some(record.handle.transaction_id);
            report.explorer_link = record.explorer_link;
            report.elapsed_ms = elapsed_ms;
        }
        EngineEvent::Failed {
            unit,
            step_range,
            error,
        } => {
            let report = open_report(units, &unit, step_range);
            report.error = Some(error.to_string());
        }
        EngineEvent::Configured { .. } | EngineEvent::Completed { .. } => {}
    }
}

/// The latest report for `label` that has not finished yet, or a new one.
fn open_report<'a>(
    units: &'a mut Vec<UnitReport>,
    label: &str,
    step_range: Range<usize>,
) -> &'a mut UnitReport {
    let reuse = units
        .last()
        .is_some_and(|last| last.label == label && !last.committed && last.error.is_none());
    if !reuse {
        units.push(UnitReport::new(label.to_string(), step_range));
    }
    let last = units.len() - 1;
    &mut units[last]
}
