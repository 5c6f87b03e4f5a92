use anyhow::{Context, Result};
use std::path::Path;

use crate::domain::ClassificationMetrics;
use crate::evaluate::{EvaluationOutcome, EvaluationReport, IncumbentScore};
use crate::promote::PromotionOutcome;

/// Write metrics as a flat `name -> value` JSON object.
pub fn write_metrics_json(path: &Path, metrics: &ClassificationMetrics) -> Result<()> {
    write_pretty(path, &metrics.to_map()).context("write metrics")
}

/// Write the full evaluation report in pretty JSON format.
pub fn write_evaluation_report_json(path: &Path, report: &EvaluationReport) -> Result<()> {
    write_pretty(path, report).context("write evaluation report")
}

fn write_pretty<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
        }
    }
    let content = serde_json::to_string_pretty(value).context("serialize report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render a markdown summary of one evaluation.
pub fn render_evaluation_summary_md(report: &EvaluationReport) -> String {
    let mut out = String::new();
    out.push_str("# Evaluation Summary\n\n");
    out.push_str(&format!("- run: `{}`\n", report.run_id));
    out.push_str(&format!(
        "- {}: candidate {:.4}",
        report.target_metric, report.candidate_score
    ));
    match &report.incumbent {
        IncumbentScore::Available { version, score } => {
            out.push_str(&format!(", production v{version} {score:.4}\n"))
        }
        IncumbentScore::Unavailable { reason } => {
            out.push_str(&format!(", production unavailable ({reason})\n"))
        }
    }
    match &report.outcome {
        EvaluationOutcome::Staged { version, .. } => {
            out.push_str(&format!("- decision: **staged** as version {version}\n"))
        }
        EvaluationOutcome::Discarded => out.push_str("- decision: **discarded**\n"),
    }

    out.push_str("\n## Metrics\n");
    for (name, value) in report.metrics.to_map() {
        out.push_str(&format!("- {name}: {value:.4}\n"));
    }
    out
}

/// One-line description of a promotion outcome for operator output.
pub fn describe_promotion(model: &str, outcome: &PromotionOutcome) -> String {
    match outcome {
        PromotionOutcome::NothingToPromote => format!("{model}: nothing staged, nothing to promote"),
        PromotionOutcome::AlreadyPromoted { version } => {
            format!("{model}: version {version} is already in production")
        }
        PromotionOutcome::Promoted { version, previous } => match previous {
            Some(prev) => format!("{model}: promoted version {version} (was {prev})"),
            None => format!("{model}: promoted version {version}"),
        },
        PromotionOutcome::Rejected { version, verdict } => {
            let reasons: Vec<&str> = verdict
                .violations
                .iter()
                .map(|v| v.reason.as_str())
                .collect();
            format!(
                "{model}: version {version} rejected by quality gate: {}",
                reasons.join("; ")
            )
        }
    }
}
