//! Output formatting for the move-sequencer CLI
//!
//! Human-readable output goes to stdout with ANSI colors; `--json` prints the
//! serialized report instead.

use serde::Serialize;
use std::error::Error as _;

use sequencer_core::{Batch, SequenceRunReport, SequenceSpec};
use sequencer_types::SimulationOutcome;

/// Format a simulation outcome for an operator prompt
pub fn format_outcome(outcome: &SimulationOutcome, verbose: bool) -> String {
    let mut out = String::new();

    if outcome.success {
        out.push_str(&format!(
            "\x1b[32m✓ Simulation succeeded:\x1b[0m {}\n",
            outcome.status_message
        ));
    } else {
        out.push_str(&format!(
            "\x1b[31m✗ Simulation rejected:\x1b[0m {}\n",
            outcome.status_message
        ));
    }
    out.push_str(&format!("  Gas estimate: {}\n", outcome.gas_estimate));

    if !outcome.events.is_empty() {
        out.push_str(&format!("  Events: {} emitted\n", outcome.events.len()));
        if verbose {
            for (i, event) in outcome.events.iter().enumerate() {
                out.push_str(&format!("    [{}] {}\n", i, event.type_tag));
            }
        }
    }
    if !outcome.state_deltas.is_empty() {
        out.push_str(&format!(
            "  State changes: {}\n",
            outcome.state_deltas.len()
        ));
        if verbose {
            for delta in &outcome.state_deltas {
                out.push_str(&format!(
                    "    {:?} {} @ {}\n",
                    delta.kind, delta.resource, delta.address
                ));
            }
        }
    }

    out
}

/// Format the batch partition of a sequence
pub fn format_plan(spec: &SequenceSpec, batches: &[Batch], batch_size: usize) -> String {
    let mut out = format!(
        "\x1b[1m{}\x1b[0m: {} step(s), {} batch(es) of up to {}\n",
        spec.display_name(),
        spec.steps.len(),
        batches.len(),
        batch_size
    );
    for batch in batches {
        out.push_str(&format!(
            "\n\x1b[1mBatch {}\x1b[0m (steps {}-{})\n",
            batch.index + 1,
            batch.range.start + 1,
            batch.range.end
        ));
        for (offset, step) in batch.steps(&spec.steps).iter().enumerate() {
            out.push_str(&format!(
                "  {:>3}. {} \x1b[36m{}\x1b[0m\n",
                batch.range.start + offset + 1,
                step.title,
                step.target
            ));
        }
    }
    out
}

pub fn format_plan_json(spec: &SequenceSpec, batches: &[Batch], batch_size: usize) -> String {
    #[derive(Serialize)]
    struct BatchJson<'a> {
        index: usize,
        start: usize,
        end: usize,
        titles: Vec<&'a str>,
    }

    #[derive(Serialize)]
    struct PlanJson<'a> {
        name: &'a str,
        total_steps: usize,
        batch_size: usize,
        batches: Vec<BatchJson<'a>>,
    }

    let json = PlanJson {
        name: spec.display_name(),
        total_steps: spec.steps.len(),
        batch_size,
        batches: batches
            .iter()
            .map(|batch| BatchJson {
                index: batch.index,
                start: batch.range.start,
                end: batch.range.end,
                titles: batch
                    .steps(&spec.steps)
                    .iter()
                    .map(|step| step.title.as_str())
                    .collect(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string())
}

/// Format a finished (or stopped) run
pub fn format_report(report: &SequenceRunReport) -> String {
    let mut out = String::new();

    if report.completed {
        out.push_str(&format!(
            "\x1b[32m✓ Sequence completed\x1b[0m: {}/{} steps committed\n\n",
            report.committed_steps, report.total_steps
        ));
    } else {
        out.push_str(&format!(
            "\x1b[31m✗ Sequence stopped\x1b[0m: {}/{} steps committed\n",
            report.committed_steps, report.total_steps
        ));
        if let Some(reason) = &report.stop_reason {
            out.push_str(&format!("  Reason: {}\n", reason));
        }
        out.push('\n');
    }

    for unit in &report.units {
        let marker = if unit.committed {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[31m✗\x1b[0m"
        };
        out.push_str(&format!("{} {}", marker, unit.label));
        if let Some(gas) = &unit.gas_estimate {
            out.push_str(&format!("  gas={}", gas));
        }
        if unit.forced {
            out.push_str("  \x1b[33m(forced)\x1b[0m");
        }
        out.push('\n');
        if let Some(link) = &unit.explorer_link {
            out.push_str(&format!("    {}\n", link));
        } else if let Some(tx) = &unit.transaction_id {
            out.push_str(&format!("    tx {}\n", tx));
        }
        if let Some(error) = &unit.error {
            out.push_str(&format!("    {}\n", error));
        }
    }

    out.push_str(&format!(
        "\nRun {} ({} mode{}) in {}ms\n",
        report.run_id,
        report.mode.as_str(),
        if report.auto_execute { ", auto-execute" } else { "" },
        report.elapsed_ms
    ));
    out
}

pub fn format_report_json(report: &SequenceRunReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

/// Format an error with its cause chain
pub fn format_error(error: &anyhow::Error, json_output: bool) -> String {
    if json_output {
        #[derive(Serialize)]
        struct ErrorJson {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            cause: Option<String>,
        }

        let err = ErrorJson {
            error: error.to_string(),
            cause: error.source().map(|e| e.to_string()),
        };
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut out = format!("\x1b[31mError:\x1b[0m {}\n", error);
        let mut causes = error.chain().skip(1).peekable();
        if causes.peek().is_some() {
            out.push_str("Caused by:\n");
            for (idx, cause) in causes.enumerate() {
                out.push_str(&format!("  {}: {}\n", idx + 1, cause));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_json_lists_batches() {
        let steps = (0..7)
            .map(|i| {
                sequencer_types::StepDefinition::new(
                    format!("step {i}"),
                    "0x2::coin::mint".parse().unwrap(),
                )
            })
            .collect();
        let spec = SequenceSpec::new(steps);
        let batches = spec.plan(5).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&format_plan_json(&spec, &batches, 5)).unwrap();
        assert_eq!(json["batches"].as_array().unwrap().len(), 2);
        assert_eq!(json["batches"][1]["start"], 5);
        assert_eq!(json["batches"][1]["titles"][1], "step 6");
    }

    #[test]
    fn rejected_outcome_is_marked() {
        let text = format_outcome(&SimulationOutcome::rejected("MoveAbort 7", 900), false);
        assert!(text.contains("Simulation rejected"));
        assert!(text.contains("900"));
    }
}
