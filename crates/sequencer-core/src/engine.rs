//! The orchestration engine.
//!
//! One spawned task owns the [`EngineState`] of the configured sequence and
//! is the only place it is mutated. Operator commands reach it over a
//! channel and are answered once the resulting snapshot is published, so a
//! caller that reads [`EngineHandle::snapshot`] after a command returns
//! always sees its effect.
//!
//! Gateway calls run as separate tasks and report back through a completion
//! channel. Each completion carries the generation of the sequence that
//! issued it; results that arrive after a reconfiguration are dropped. The
//! auto-execute settle delay is a sleeping task that sends a trigger tagged
//! with the current auto epoch, and any later simulation start or auto-execute
//! toggle bumps the epoch so a stale trigger is ignored.
//!
//! ```text
//!   EngineHandle ──Command──▶ ┌──────────────┐ ──spawn──▶ gateway call
//!                             │ engine task  │
//!   watch<EngineSnapshot> ◀── │ EngineState  │ ◀─Completion─┘
//!   broadcast<EngineEvent> ◀─ └──────────────┘ ◀─AutoTrigger── settle timer
//! ```

use serde::Serialize;
use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use sequencer_types::{ExecutionHandle, SimulationOutcome, StepDefinition};

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::gateway::{ExecutionGateway, SimulationGateway};
use crate::ledger::{LedgerClient, SignerProvider};
use crate::state::{
    Ack, EngineSnapshot, EngineState, ExecutionFollowUp, ExecutionMode, ExecutionRecord,
    IgnoredReason, Phase, SimulationFollowUp, WorkUnit,
};

const COMMAND_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 256;

/// Notifications emitted as the engine makes progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Configured {
        generation: u64,
        total_steps: usize,
        mode: ExecutionMode,
    },
    Simulated {
        unit: String,
        step_range: Range<usize>,
        outcome: SimulationOutcome,
    },
    Executed {
        record: ExecutionRecord,
        /// From the start of the unit's simulation to the accepted submit.
        elapsed_ms: u64,
    },
    Failed {
        unit: String,
        step_range: Range<usize>,
        error: EngineError,
    },
    Completed {
        total_steps: usize,
    },
}

enum Command {
    Configure {
        steps: Vec<StepDefinition>,
        mode: ExecutionMode,
        auto_execute: bool,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Simulate {
        reply: oneshot::Sender<Ack>,
    },
    Confirm {
        force: bool,
        reply: oneshot::Sender<Ack>,
    },
    Cancel {
        reply: oneshot::Sender<Ack>,
    },
    SetMode {
        mode: ExecutionMode,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    SetAutoExecute {
        enabled: bool,
        reply: oneshot::Sender<Ack>,
    },
    Shutdown,
}

enum Completion {
    Simulated {
        generation: u64,
        unit: WorkUnit,
        result: Result<SimulationOutcome, EngineError>,
    },
    Executed {
        generation: u64,
        unit: WorkUnit,
        result: Result<ExecutionHandle, EngineError>,
    },
    AutoTrigger {
        generation: u64,
        epoch: u64,
    },
}

/// Cloneable handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<EngineSnapshot>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    /// (Re)initialize the engine with a new sequence. Refused while a call is
    /// in flight; any pending decision or scheduled trigger of the previous
    /// sequence is discarded.
    pub async fn configure(
        &self,
        steps: Vec<StepDefinition>,
        mode: ExecutionMode,
        auto_execute: bool,
    ) -> Result<(), EngineError> {
        self.request(|reply| Command::Configure {
            steps,
            mode,
            auto_execute,
            reply,
        })
        .await
        .unwrap_or_else(|| Err(EngineError::configuration("the engine has stopped")))
    }

    /// Simulate the current unit. Ignored unless the engine is idle.
    pub async fn trigger_simulate(&self) -> Ack {
        self.ack(|reply| Command::Simulate { reply }).await
    }

    /// Execute the pending unit. A rejected simulation is not executed; see
    /// [`EngineHandle::force_confirm`].
    pub async fn confirm(&self) -> Ack {
        self.ack(|reply| Command::Confirm { force: false, reply })
            .await
    }

    /// Execute the pending unit even though its simulation was rejected.
    pub async fn force_confirm(&self) -> Ack {
        self.ack(|reply| Command::Confirm { force: true, reply })
            .await
    }

    /// Discard the pending outcome without executing.
    pub async fn cancel(&self) -> Ack {
        self.ack(|reply| Command::Cancel { reply }).await
    }

    pub async fn set_mode(&self, mode: ExecutionMode) -> Result<(), EngineError> {
        self.request(|reply| Command::SetMode { mode, reply })
            .await
            .unwrap_or_else(|| Err(EngineError::configuration("the engine has stopped")))
    }

    /// Toggle auto-execute. Disabling it also drops a scheduled trigger.
    pub async fn set_auto_execute(&self, enabled: bool) -> Ack {
        self.ack(|reply| Command::SetAutoExecute { enabled, reply })
            .await
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn current_phase(&self) -> Phase {
        self.snapshots.borrow().phase
    }

    pub fn current_unit_index(&self) -> usize {
        self.snapshots.borrow().current_unit_index()
    }

    pub fn pending_outcome(&self) -> Option<SimulationOutcome> {
        self.snapshots.borrow().pending_outcome.clone()
    }

    /// Receiver of every published snapshot.
    pub fn watch(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Wait for the first snapshot satisfying `predicate`. Returns the last
    /// snapshot if the engine stops first.
    pub async fn wait_until<F>(&self, mut predicate: F) -> EngineSnapshot
    where
        F: FnMut(&EngineSnapshot) -> bool,
    {
        let mut receiver = self.snapshots.clone();
        let result = receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map(|snapshot| (*snapshot).clone());
        match result {
            Ok(snapshot) => snapshot,
            Err(_) => receiver.borrow().clone(),
        }
    }

    /// Stop the engine task. In-flight calls still run to completion but
    /// their results are discarded.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).await.ok()?;
        response.await.ok()
    }

    async fn ack(&self, build: impl FnOnce(oneshot::Sender<Ack>) -> Command) -> Ack {
        self.request(build)
            .await
            .unwrap_or(Ack::Ignored(IgnoredReason::Stopped))
    }
}

/// Owner of the engine state; lives inside the spawned task.
pub struct OrchestrationEngine {
    config: EngineConfig,
    simulation: SimulationGateway,
    execution: ExecutionGateway,
    state: Option<EngineState>,
    generation: u64,
    auto_epoch: u64,
    trigger_scheduled: bool,
    unit_started: Option<Instant>,
    completions: mpsc::UnboundedSender<Completion>,
    snapshots: watch::Sender<EngineSnapshot>,
    events: broadcast::Sender<EngineEvent>,
}

impl OrchestrationEngine {
    /// Validate `config` and start the engine task on the current runtime.
    pub fn spawn(
        config: EngineConfig,
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn SignerProvider>,
    ) -> Result<EngineHandle, EngineError> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(EngineSnapshot::default());
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        info!(
            ledger = ledger.network_name(),
            batch_size = config.batch_size,
            settle_delay_ms = config.settle_delay.as_millis() as u64,
            "starting orchestration engine"
        );

        let engine = Self {
            simulation: SimulationGateway::new(ledger.clone(), signer.clone()),
            execution: ExecutionGateway::new(ledger, signer, config.submit_options()),
            config,
            state: None,
            generation: 0,
            auto_epoch: 0,
            trigger_scheduled: false,
            unit_started: None,
            completions: completion_tx,
            snapshots: snapshot_tx,
            events: event_tx.clone(),
        };
        tokio::spawn(engine.run(command_rx, completion_rx));

        Ok(EngineHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            events: event_tx,
        })
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                Some(completion) = completions.recv() => self.handle_completion(completion),
            }
        }
        debug!(generation = self.generation, "orchestration engine stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Configure {
                steps,
                mode,
                auto_execute,
                reply,
            } => {
                let result = self.configure(steps, mode, auto_execute);
                self.publish();
                let _ = reply.send(result);
            }
            Command::Simulate { reply } => {
                let ack = self.start_simulation();
                self.publish();
                let _ = reply.send(ack);
            }
            Command::Confirm { force, reply } => {
                let ack = self.start_execution(force);
                self.publish();
                let _ = reply.send(ack);
            }
            Command::Cancel { reply } => {
                let ack = match self.state.as_mut() {
                    Some(state) => Ack::from(state.cancel()),
                    None => Ack::Ignored(IgnoredReason::NotConfigured),
                };
                if ack.is_accepted() {
                    info!("pending simulation discarded");
                }
                self.publish();
                let _ = reply.send(ack);
            }
            Command::SetMode { mode, reply } => {
                let result = match self.state.as_mut() {
                    Some(state) => state.set_mode(mode),
                    None => Err(EngineError::configuration("no sequence is configured")),
                };
                if result.is_ok() {
                    info!(mode = mode.as_str(), "execution mode changed");
                }
                self.publish();
                let _ = reply.send(result);
            }
            Command::SetAutoExecute { enabled, reply } => {
                let ack = match self.state.as_mut() {
                    Some(state) => {
                        state.set_auto_execute(enabled);
                        if !enabled {
                            self.cancel_scheduled_trigger();
                        }
                        Ack::Accepted
                    }
                    None => Ack::Ignored(IgnoredReason::NotConfigured),
                };
                self.publish();
                let _ = reply.send(ack);
            }
            Command::Shutdown => {}
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Simulated {
                generation,
                unit,
                result,
            } => {
                if generation != self.generation {
                    debug!(generation, "dropping simulation result of a previous sequence");
                    return;
                }
                self.on_simulated(unit, result);
            }
            Completion::Executed {
                generation,
                unit,
                result,
            } => {
                if generation != self.generation {
                    debug!(generation, "dropping execution result of a previous sequence");
                    return;
                }
                self.on_executed(unit, result);
            }
            Completion::AutoTrigger { generation, epoch } => {
                if generation != self.generation || epoch != self.auto_epoch {
                    debug!(generation, epoch, "dropping stale auto-execute trigger");
                    return;
                }
                self.trigger_scheduled = false;
                let auto_execute = self.state.as_ref().is_some_and(EngineState::auto_execute);
                if auto_execute {
                    if let Ack::Ignored(reason) = self.start_simulation() {
                        debug!(%reason, "auto-execute trigger ignored");
                    }
                }
            }
        }
        self.publish();
    }

    fn configure(
        &mut self,
        steps: Vec<StepDefinition>,
        mode: ExecutionMode,
        auto_execute: bool,
    ) -> Result<(), EngineError> {
        if self.state.as_ref().is_some_and(EngineState::is_busy) {
            return Err(EngineError::configuration(
                "cannot reconfigure while a call is in flight",
            ));
        }
        let generation = self.generation + 1;
        let state = EngineState::new(steps, mode, auto_execute, self.config.batch_size, generation)?;

        info!(
            generation,
            steps = state.total_steps(),
            batches = state.batches().len(),
            mode = mode.as_str(),
            auto_execute,
            "sequence configured"
        );
        self.emit(EngineEvent::Configured {
            generation,
            total_steps: state.total_steps(),
            mode,
        });
        self.generation = generation;
        self.cancel_scheduled_trigger();
        self.state = Some(state);
        Ok(())
    }

    fn start_simulation(&mut self) -> Ack {
        let Some(state) = self.state.as_mut() else {
            return Ack::Ignored(IgnoredReason::NotConfigured);
        };
        let unit = match state.begin_simulation() {
            Ok(unit) => unit,
            Err(reason) => return Ack::Ignored(reason),
        };
        info!(
            unit = %unit.label(),
            cursor = state.cursor(),
            batch_cursor = state.batch_cursor(),
            "simulating"
        );
        self.cancel_scheduled_trigger();
        self.unit_started = Some(Instant::now());

        let gateway = self.simulation.clone();
        let completions = self.completions.clone();
        let generation = self.generation;
        let limit = self.config.call_timeout;
        tokio::spawn(async move {
            let result = bounded(limit, gateway.evaluate(&unit), |limit| {
                EngineError::Evaluation(format!(
                    "evaluate {} timed out after {}ms",
                    unit.label(),
                    limit.as_millis()
                ))
            })
            .await;
            let _ = completions.send(Completion::Simulated {
                generation,
                unit,
                result,
            });
        });
        Ack::Accepted
    }

    fn start_execution(&mut self, force: bool) -> Ack {
        let Some(state) = self.state.as_mut() else {
            return Ack::Ignored(IgnoredReason::NotConfigured);
        };
        let unit = match state.begin_execution(force) {
            Ok(unit) => unit,
            Err(reason) => return Ack::Ignored(reason),
        };
        if force {
            warn!(unit = %unit.label(), "executing despite rejected simulation");
        }
        info!(unit = %unit.label(), "executing");

        let gateway = self.execution.clone();
        let completions = self.completions.clone();
        let generation = self.generation;
        let limit = self.config.call_timeout;
        tokio::spawn(async move {
            let result = bounded(limit, gateway.submit(&unit), |limit| {
                EngineError::Submission(format!(
                    "submit {} timed out after {}ms; the transaction may still be processed",
                    unit.label(),
                    limit.as_millis()
                ))
            })
            .await;
            let _ = completions.send(Completion::Executed {
                generation,
                unit,
                result,
            });
        });
        Ack::Accepted
    }

    fn on_simulated(&mut self, unit: WorkUnit, result: Result<SimulationOutcome, EngineError>) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let event = match &result {
            Ok(outcome) => EngineEvent::Simulated {
                unit: unit.label(),
                step_range: unit.step_range(),
                outcome: outcome.clone(),
            },
            Err(error) => EngineEvent::Failed {
                unit: unit.label(),
                step_range: unit.step_range(),
                error: error.clone(),
            },
        };
        let follow_up = state.finish_simulation(result);
        self.emit(event);

        match follow_up {
            SimulationFollowUp::AutoConfirm => {
                debug!(unit = %unit.label(), "auto-confirming");
                if let Ack::Ignored(reason) = self.start_execution(false) {
                    warn!(%reason, "auto-confirm was not accepted");
                }
            }
            SimulationFollowUp::AwaitDecision => {
                debug!(unit = %unit.label(), "awaiting decision");
            }
            SimulationFollowUp::Failed => {}
        }
    }

    fn on_executed(&mut self, unit: WorkUnit, result: Result<ExecutionHandle, EngineError>) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let failure = result.as_ref().err().cloned();
        let follow_up = state.finish_execution(result, self.config.explorer_url.as_deref());
        let total_steps = state.total_steps();
        let cursor = state.cursor();
        let record = state.snapshot().last_execution;

        let elapsed_ms = self
            .unit_started
            .take()
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or_default();

        match failure {
            Some(error) => self.emit(EngineEvent::Failed {
                unit: unit.label(),
                step_range: unit.step_range(),
                error,
            }),
            None => {
                if let Some(record) = record {
                    info!(
                        unit = %record.label,
                        tx_id = %record.handle.transaction_id,
                        cursor,
                        total_steps,
                        elapsed_ms,
                        "unit committed"
                    );
                    self.emit(EngineEvent::Executed { record, elapsed_ms });
                }
            }
        }

        match follow_up {
            ExecutionFollowUp::Completed => {
                info!(total_steps, "sequence completed");
                self.emit(EngineEvent::Completed { total_steps });
            }
            ExecutionFollowUp::ScheduleNext => self.schedule_trigger(),
            ExecutionFollowUp::AwaitOperator | ExecutionFollowUp::Failed => {}
        }
    }

    fn schedule_trigger(&mut self) {
        self.trigger_scheduled = true;
        let completions = self.completions.clone();
        let generation = self.generation;
        let epoch = self.auto_epoch;
        let delay = self.config.settle_delay;
        debug!(delay_ms = delay.as_millis() as u64, "scheduling next simulation");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = completions.send(Completion::AutoTrigger { generation, epoch });
        });
    }

    fn cancel_scheduled_trigger(&mut self) {
        self.auto_epoch += 1;
        self.trigger_scheduled = false;
    }

    fn publish(&self) {
        let snapshot = match &self.state {
            Some(state) => {
                let mut snapshot = state.snapshot();
                snapshot.next_trigger_scheduled = self.trigger_scheduled;
                snapshot
            }
            None => EngineSnapshot {
                generation: self.generation,
                ..EngineSnapshot::default()
            },
        };
        self.snapshots.send_replace(snapshot);
    }

    fn emit(&self, event: EngineEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

async fn bounded<T>(
    limit: Option<Duration>,
    call: impl Future<Output = Result<T, EngineError>>,
    on_timeout: impl FnOnce(Duration) -> EngineError,
) -> Result<T, EngineError> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(limit)),
        },
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_maps_elapsed_to_error() {
        let result: Result<(), EngineError> = bounded(
            Some(Duration::from_millis(10)),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            |limit| EngineError::Evaluation(format!("timed out after {}ms", limit.as_millis())),
        )
        .await;
        assert_eq!(
            result,
            Err(EngineError::Evaluation("timed out after 10ms".to_string()))
        );
    }

    #[tokio::test]
    async fn bounded_without_limit_waits() {
        let result = bounded(None, async { Ok::<_, EngineError>(7) }, |_| {
            EngineError::Evaluation(String::new())
        })
        .await;
        assert_eq!(result, Ok(7));
    }
}
