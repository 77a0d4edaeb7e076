//! Engine state machine.
//!
//! `EngineState` owns the cursor bookkeeping for one configured sequence and
//! applies transitions synchronously. It performs no I/O: the engine actor
//! asks it for the next [`WorkUnit`], runs the gateway call, and feeds the
//! result back in. Keeping the transitions pure lets the invariants be
//! checked directly in tests.
//!
//! ```text
//! Idle --trigger--> Simulating --ok--> AwaitingConfirmation --confirm--> Executing
//!  ^                    |                   |                              |
//!  |<----- error -------+                   +--cancel--> Idle              +--ok--> Idle | Completed
//!  |<------------------------------------------------------- error -------+
//! ```

use serde::{Deserialize, Serialize};
use std::ops::Range;

use sequencer_types::{ExecutionHandle, SimulationOutcome, StepDefinition};

use crate::errors::EngineError;
use crate::planner::{Batch, BatchPlanner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Simulating,
    AwaitingConfirmation,
    Executing,
    Completed,
}

impl Phase {
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Simulating | Self::Executing)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Single,
    Batch,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Batch => "batch",
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "batch" => Ok(Self::Batch),
            other => Err(anyhow::anyhow!(
                "invalid mode `{}` (expected one of: single, batch)",
                other
            )),
        }
    }
}

/// The unit simulated and executed as one remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkUnit {
    Single {
        index: usize,
        step: StepDefinition,
    },
    Batch {
        batch_index: usize,
        start: usize,
        steps: Vec<StepDefinition>,
    },
}

impl WorkUnit {
    pub fn step_count(&self) -> usize {
        match self {
            Self::Single { .. } => 1,
            Self::Batch { steps, .. } => steps.len(),
        }
    }

    /// Indices of the steps covered by this unit.
    pub fn step_range(&self) -> Range<usize> {
        match self {
            Self::Single { index, .. } => *index..*index + 1,
            Self::Batch { start, steps, .. } => *start..*start + steps.len(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Single { index, step } => format!("step {} ({})", index + 1, step.title),
            Self::Batch {
                batch_index,
                start,
                steps,
            } => format!(
                "batch {} (steps {}-{})",
                batch_index + 1,
                start + 1,
                start + steps.len()
            ),
        }
    }

    pub fn titles(&self) -> Vec<String> {
        match self {
            Self::Single { step, .. } => vec![step.title.clone()],
            Self::Batch { steps, .. } => steps.iter().map(|s| s.title.clone()).collect(),
        }
    }
}

/// Why a command was answered without a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoredReason {
    /// A simulate or execute call is in flight.
    Busy,
    /// The sequence already finished.
    Completed,
    /// `configure` has not been called.
    NotConfigured,
    /// There is no outcome awaiting a decision.
    NothingPending,
    /// A decision is pending; trigger is only accepted from `Idle`.
    NotIdle,
    /// The simulation was rejected; use `force_confirm` to proceed anyway.
    RequiresOverride,
    /// The engine task has shut down.
    Stopped,
}

impl std::fmt::Display for IgnoredReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Busy => "a call is already in flight",
            Self::Completed => "the sequence is complete",
            Self::NotConfigured => "no sequence is configured",
            Self::NothingPending => "no simulation outcome is awaiting a decision",
            Self::NotIdle => "a simulation outcome is awaiting a decision",
            Self::RequiresOverride => "simulation was rejected; an explicit override is required",
            Self::Stopped => "the engine has stopped",
        };
        f.write_str(text)
    }
}

/// Reply to an operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ack {
    Accepted,
    Ignored(IgnoredReason),
}

impl Ack {
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

impl From<Result<(), IgnoredReason>> for Ack {
    fn from(result: Result<(), IgnoredReason>) -> Self {
        match result {
            Ok(()) => Self::Accepted,
            Err(reason) => Self::Ignored(reason),
        }
    }
}

/// A successfully submitted unit, kept so the operator can follow a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub label: String,
    pub step_range: Range<usize>,
    pub handle: ExecutionHandle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_link: Option<String>,
}

/// What the caller should do after a simulation result was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationFollowUp {
    AwaitDecision,
    AutoConfirm,
    Failed,
}

/// What the caller should do after an execution result was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionFollowUp {
    Completed,
    ScheduleNext,
    AwaitOperator,
    Failed,
}

/// Observable engine state, published after every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub configured: bool,
    pub generation: u64,
    pub phase: Phase,
    pub mode: ExecutionMode,
    pub auto_execute: bool,
    pub cursor: usize,
    pub batch_cursor: usize,
    pub total_steps: usize,
    pub total_batches: usize,
    pub is_busy: bool,
    /// An auto-execute trigger is waiting out the settle delay.
    pub next_trigger_scheduled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_outcome: Option<SimulationOutcome>,
    /// Steps covered by the unit awaiting a decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_steps: Option<Range<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<EngineError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_execution: Option<ExecutionRecord>,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            configured: false,
            generation: 0,
            phase: Phase::Idle,
            mode: ExecutionMode::Single,
            auto_execute: false,
            cursor: 0,
            batch_cursor: 0,
            total_steps: 0,
            total_batches: 0,
            is_busy: false,
            next_trigger_scheduled: false,
            pending_outcome: None,
            pending_steps: None,
            last_error: None,
            last_execution: None,
        }
    }
}

impl EngineSnapshot {
    /// Index of the next unit: a step index in single mode, a batch index in
    /// batch mode.
    pub fn current_unit_index(&self) -> usize {
        match self.mode {
            ExecutionMode::Single => self.cursor,
            ExecutionMode::Batch => self.batch_cursor,
        }
    }

    /// Nothing in flight and nothing scheduled: the engine waits on the
    /// operator or is done.
    pub fn is_settled(&self) -> bool {
        !self.is_busy && !self.next_trigger_scheduled
    }
}

#[derive(Debug, Clone)]
struct PendingDecision {
    unit: WorkUnit,
    outcome: SimulationOutcome,
}

#[derive(Debug, Clone)]
pub struct EngineState {
    steps: Vec<StepDefinition>,
    planner: BatchPlanner,
    batches: Vec<Batch>,
    generation: u64,
    cursor: usize,
    batch_cursor: usize,
    mode: ExecutionMode,
    auto_execute: bool,
    phase: Phase,
    pending: Option<PendingDecision>,
    in_flight: Option<WorkUnit>,
    last_error: Option<EngineError>,
    last_execution: Option<ExecutionRecord>,
}

impl EngineState {
    pub fn new(
        steps: Vec<StepDefinition>,
        mode: ExecutionMode,
        auto_execute: bool,
        batch_size: usize,
        generation: u64,
    ) -> Result<Self, EngineError> {
        if steps.is_empty() {
            return Err(EngineError::configuration(
                "step sequence must contain at least one step",
            ));
        }
        let planner = BatchPlanner::new(batch_size)?;
        let batches = planner.partition(&steps);
        Ok(Self {
            steps,
            planner,
            batches,
            generation,
            cursor: 0,
            batch_cursor: 0,
            mode,
            auto_execute,
            phase: Phase::Idle,
            pending: None,
            in_flight: None,
            last_error: None,
            last_execution: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn batch_cursor(&self) -> usize {
        self.batch_cursor
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn auto_execute(&self) -> bool {
        self.auto_execute
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn is_busy(&self) -> bool {
        self.phase.is_busy()
    }

    pub fn pending_outcome(&self) -> Option<&SimulationOutcome> {
        self.pending.as_ref().map(|pending| &pending.outcome)
    }

    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// The unit a trigger would simulate now, if any.
    pub fn current_unit(&self) -> Option<WorkUnit> {
        if self.cursor >= self.steps.len() {
            return None;
        }
        match self.mode {
            ExecutionMode::Single => Some(WorkUnit::Single {
                index: self.cursor,
                step: self.steps[self.cursor].clone(),
            }),
            ExecutionMode::Batch => {
                let batch = self.batches.get(self.batch_cursor)?;
                Some(WorkUnit::Batch {
                    batch_index: batch.index,
                    start: batch.start(),
                    steps: batch.steps(&self.steps).to_vec(),
                })
            }
        }
    }

    /// `Idle -> Simulating`.
    pub fn begin_simulation(&mut self) -> Result<WorkUnit, IgnoredReason> {
        match self.phase {
            Phase::Simulating | Phase::Executing => return Err(IgnoredReason::Busy),
            Phase::Completed => return Err(IgnoredReason::Completed),
            Phase::AwaitingConfirmation => return Err(IgnoredReason::NotIdle),
            Phase::Idle => {}
        }
        let unit = self.current_unit().ok_or(IgnoredReason::Completed)?;
        self.phase = Phase::Simulating;
        self.last_error = None;
        self.in_flight = Some(unit.clone());
        Ok(unit)
    }

    /// Apply the result of the in-flight simulation.
    pub fn finish_simulation(
        &mut self,
        result: Result<SimulationOutcome, EngineError>,
    ) -> SimulationFollowUp {
        debug_assert_eq!(self.phase, Phase::Simulating);
        let unit = self.in_flight.take();
        match (result, unit) {
            (Ok(outcome), Some(unit)) => {
                let auto_confirm = self.auto_execute && outcome.success;
                self.pending = Some(PendingDecision { unit, outcome });
                self.phase = Phase::AwaitingConfirmation;
                if auto_confirm {
                    SimulationFollowUp::AutoConfirm
                } else {
                    SimulationFollowUp::AwaitDecision
                }
            }
            (Err(err), _) => {
                self.phase = Phase::Idle;
                self.last_error = Some(err);
                SimulationFollowUp::Failed
            }
            (Ok(_), None) => {
                self.phase = Phase::Idle;
                self.last_error = Some(EngineError::Evaluation(
                    "simulation finished without a unit in flight".to_string(),
                ));
                SimulationFollowUp::Failed
            }
        }
    }

    /// `AwaitingConfirmation -> Executing`.
    ///
    /// A rejected simulation (`success == false`) is only executed with
    /// `force`.
    pub fn begin_execution(&mut self, force: bool) -> Result<WorkUnit, IgnoredReason> {
        match self.phase {
            Phase::Simulating | Phase::Executing => return Err(IgnoredReason::Busy),
            Phase::Completed => return Err(IgnoredReason::Completed),
            Phase::Idle => return Err(IgnoredReason::NothingPending),
            Phase::AwaitingConfirmation => {}
        }
        let approved = self
            .pending
            .as_ref()
            .map(|pending| pending.outcome.success || force)
            .ok_or(IgnoredReason::NothingPending)?;
        if !approved {
            return Err(IgnoredReason::RequiresOverride);
        }
        let pending = self.pending.take().ok_or(IgnoredReason::NothingPending)?;
        self.phase = Phase::Executing;
        self.in_flight = Some(pending.unit.clone());
        Ok(pending.unit)
    }

    /// `AwaitingConfirmation -> Idle`, discarding the outcome.
    pub fn cancel(&mut self) -> Result<(), IgnoredReason> {
        match self.phase {
            Phase::AwaitingConfirmation => {
                self.pending = None;
                self.phase = Phase::Idle;
                Ok(())
            }
            Phase::Simulating | Phase::Executing => Err(IgnoredReason::Busy),
            Phase::Completed => Err(IgnoredReason::Completed),
            Phase::Idle => Err(IgnoredReason::NothingPending),
        }
    }

    /// Apply the result of the in-flight submission.
    pub fn finish_execution(
        &mut self,
        result: Result<ExecutionHandle, EngineError>,
        explorer_url: Option<&str>,
    ) -> ExecutionFollowUp {
        debug_assert_eq!(self.phase, Phase::Executing);
        let unit = self.in_flight.take();
        match (result, unit) {
            (Ok(handle), Some(unit)) => {
                self.cursor = (self.cursor + unit.step_count()).min(self.steps.len());
                if let WorkUnit::Batch { batch_index, .. } = unit {
                    self.batch_cursor = batch_index + 1;
                }
                self.last_execution = Some(ExecutionRecord {
                    label: unit.label(),
                    step_range: unit.step_range(),
                    explorer_link: explorer_url.map(|base| handle.explorer_link(base)),
                    handle,
                });
                if self.cursor == self.steps.len() {
                    self.phase = Phase::Completed;
                    ExecutionFollowUp::Completed
                } else {
                    self.phase = Phase::Idle;
                    if self.auto_execute {
                        ExecutionFollowUp::ScheduleNext
                    } else {
                        ExecutionFollowUp::AwaitOperator
                    }
                }
            }
            (Err(err), _) => {
                self.phase = Phase::Idle;
                self.last_error = Some(err);
                ExecutionFollowUp::Failed
            }
            (Ok(_), None) => {
                self.phase = Phase::Idle;
                self.last_error = Some(EngineError::Submission(
                    "execution finished without a unit in flight".to_string(),
                ));
                ExecutionFollowUp::Failed
            }
        }
    }

    /// Switch between single-step and batch execution.
    ///
    /// Only allowed while `Idle` (or `Completed`, where it is a no-op in
    /// effect). Switching to batch mode requires the cursor to sit on a batch
    /// boundary; the batch cursor is then derived from it.
    pub fn set_mode(&mut self, mode: ExecutionMode) -> Result<(), EngineError> {
        if self.phase.is_busy() || self.phase == Phase::AwaitingConfirmation {
            return Err(EngineError::configuration(
                "mode can only be changed while idle",
            ));
        }
        if mode == ExecutionMode::Batch && !self.planner.is_aligned(self.cursor) {
            return Err(EngineError::configuration(format!(
                "cannot switch to batch mode at step {}: cursor is not on a batch boundary (batch size {})",
                self.cursor,
                self.planner.size()
            )));
        }
        if mode == ExecutionMode::Batch {
            self.batch_cursor = self.cursor / self.planner.size();
        }
        self.mode = mode;
        Ok(())
    }

    pub fn set_auto_execute(&mut self, enabled: bool) {
        self.auto_execute = enabled;
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            configured: true,
            generation: self.generation,
            phase: self.phase,
            mode: self.mode,
            auto_execute: self.auto_execute,
            cursor: self.cursor,
            batch_cursor: self.batch_cursor,
            total_steps: self.steps.len(),
            total_batches: self.batches.len(),
            is_busy: self.is_busy(),
            next_trigger_scheduled: false,
            pending_outcome: self.pending_outcome().cloned(),
            pending_steps: self.pending.as_ref().map(|pending| pending.unit.step_range()),
            last_error: self.last_error.clone(),
            last_execution: self.last_execution.clone(),
        }
    }

    /// Structural invariants; violated only by a bug in this module.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.cursor > self.steps.len() {
            return Err(format!(
                "cursor {} exceeds step count {}",
                self.cursor,
                self.steps.len()
            ));
        }
        if self.pending.is_some() != (self.phase == Phase::AwaitingConfirmation) {
            return Err(format!(
                "pending outcome presence does not match phase {:?}",
                self.phase
            ));
        }
        if self.in_flight.is_some() != self.phase.is_busy() {
            return Err(format!(
                "in-flight unit presence does not match phase {:?}",
                self.phase
            ));
        }
        if (self.cursor == self.steps.len()) != (self.phase == Phase::Completed) {
            return Err(format!(
                "cursor {} and phase {:?} disagree on completion",
                self.cursor, self.phase
            ));
        }
        Ok(())
    }
}
