use std::fmt::Write;

use super::GenerationReport;
use crate::outcome::GenerationOutcome;

/// Human-readable report, written next to the bundles.
pub fn render_markdown(report: &GenerationReport) -> String {
    let mut out = String::new();
    // fmt::Write into a String cannot fail
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, report: &GenerationReport) -> std::fmt::Result {
    writeln!(out, "# Conformance Pack Generation Report")?;
    writeln!(out)?;
    writeln!(out, "Job: `{}`", report.job_id)?;
    writeln!(
        out,
        "Generated: {}",
        report.generated_at.format("%Y-%m-%dT%H:%M:%SZ")
    )?;
    writeln!(out)?;

    writeln!(out, "## Summary")?;
    writeln!(out)?;
    let status = match &report.outcome {
        GenerationOutcome::Generated { .. } => "packs generated",
        GenerationOutcome::PartiallyGenerated { .. } => "packs partially generated",
        GenerationOutcome::Unavailable { .. } => "pack generation unavailable",
    };
    writeln!(out, "- Status: **{status}**")?;
    if let GenerationOutcome::Unavailable { reason } = &report.outcome {
        writeln!(out, "- Reason: {reason}")?;
    }
    writeln!(out, "- Total unique rules: {}", report.total_rules)?;
    writeln!(out, "- Successfully processed: {}", report.succeeded)?;
    writeln!(out, "- Failed to process: {}", report.failed.len())?;
    if !report.missing_batches.is_empty() {
        writeln!(
            out,
            "- Not processed (missing batches): {}",
            report.missing_rules.len()
        )?;
    }
    writeln!(out, "- Conformance packs generated: {}", report.bundles.len())?;
    writeln!(
        out,
        "- Limits: {} bytes, {} rules per pack",
        report.max_bundle_bytes, report.max_rules_per_bundle
    )?;
    writeln!(out)?;

    if !report.bundles.is_empty() {
        writeln!(out, "## Conformance Packs")?;
        writeln!(out)?;
        for bundle in &report.bundles {
            writeln!(out, "### {}", bundle.name)?;
            writeln!(out, "- File: `{}`", bundle.file_name)?;
            writeln!(out, "- Rules: {}", bundle.rule_count)?;
            writeln!(
                out,
                "- Size: {} bytes ({:.1}% of limit)",
                bundle.byte_size, bundle.percent_of_limit
            )?;
            writeln!(out, "- SHA-256: `{}`", bundle.sha256)?;
            if bundle.oversized {
                writeln!(
                    out,
                    "- **Oversized**: this single rule exceeds the {} byte limit and will need manual splitting",
                    report.max_bundle_bytes
                )?;
            }
            writeln!(out, "- Deploy command:")?;
            writeln!(out, "  ```bash")?;
            writeln!(out, "  aws configservice put-conformance-pack \\")?;
            writeln!(out, "    --conformance-pack-name {} \\", bundle.name)?;
            writeln!(out, "    --template-body file://{}", bundle.file_name)?;
            writeln!(out, "  ```")?;
            writeln!(out)?;
        }
    }

    if !report.failed.is_empty() {
        writeln!(out, "## Failed Rules")?;
        writeln!(out)?;
        writeln!(out, "| Rule | Reason | Detail |")?;
        writeln!(out, "|------|--------|--------|")?;
        for failed in &report.failed {
            writeln!(
                out,
                "| `{}` | {} | {} |",
                failed.rule_identifier,
                failed.reason,
                table_cell(&failed.detail)
            )?;
        }
        writeln!(out)?;
    }

    if !report.missing_batches.is_empty() {
        writeln!(out, "## Missing Batches")?;
        writeln!(out)?;
        for id in &report.missing_batches {
            writeln!(out, "- batch {id}")?;
        }
        writeln!(out)?;
    }

    let rerun = report.rerun_identifiers();
    if !rerun.is_empty() {
        writeln!(out, "## Re-run")?;
        writeln!(out)?;
        writeln!(out, "Rule identifiers to re-process:")?;
        writeln!(out)?;
        writeln!(out, "```")?;
        for id in rerun {
            writeln!(out, "{id}")?;
        }
        writeln!(out, "```")?;
    }
    Ok(())
}

fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
