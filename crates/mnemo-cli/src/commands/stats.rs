use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use mnemo_retention::memory::types::StorageTier;
use mnemo_retention::metrics::MetricsSnapshot;

use super::optimize::status_label;
use crate::client::AdminClient;
use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, to_json};

#[derive(Parser)]
pub struct StatsCommand {}

impl StatsCommand {
    pub async fn execute(&self, client: &AdminClient, format: OutputFormat) -> CliResult<()> {
        let metrics = client.metrics().await?;
        println!("{}", render(&metrics, format)?);
        Ok(())
    }
}

pub fn render(metrics: &MetricsSnapshot, format: OutputFormat) -> CliResult<String> {
    if format == OutputFormat::Json {
        return to_json(metrics);
    }

    let mut tiers = Table::new();
    tiers
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Tier", "Items", "Share"]);
    for tier in StorageTier::ALL {
        let count = metrics.per_tier_counts.get(&tier).copied().unwrap_or(0);
        tiers.add_row([
            tier.to_string(),
            count.to_string(),
            format_share(count, metrics.total_items),
        ]);
    }

    let mut counters = Table::new();
    counters
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Metric", "Value"]);
    counters.add_row([
        "Cache hit rate".to_string(),
        format!("{:.1}%", metrics.cache_hit_rate * 100.0),
    ]);
    counters.add_row([
        "Avg retrieval latency".to_string(),
        format!("{:.2} ms", metrics.avg_retrieval_latency_ms),
    ]);
    counters.add_row([
        "Passes (run / failed / skipped)".to_string(),
        format!(
            "{} / {} / {}",
            metrics.passes_run, metrics.passes_failed, metrics.passes_skipped
        ),
    ]);
    counters.add_row([
        "Migrations (ok / failed)".to_string(),
        format!(
            "{} / {}",
            metrics.migrations_performed, metrics.migrations_failed
        ),
    ]);
    counters.add_row(["Rollbacks".to_string(), metrics.rollbacks.to_string()]);
    counters.add_row([
        "Capacity fallbacks".to_string(),
        metrics.capacity_fallbacks.to_string(),
    ]);
    counters.add_row([
        "Classifier unavailable".to_string(),
        metrics.classifier_unavailable.to_string(),
    ]);

    let mut out = String::new();
    out.push_str("Mnemo Retention Statistics\n");
    out.push_str("==========================\n\n");
    out.push_str(&format!("{tiers}\n\n"));
    out.push_str(&format!("{counters}\n\n"));
    out.push_str(&format!("Total: {} items", metrics.total_items));
    if let Some(pass) = &metrics.last_pass {
        out.push_str(&format!(
            "\nLast pass: {} at {} ({} ms)",
            status_label(&pass.status),
            format_timestamp(&pass.started_at),
            pass.duration_ms
        ));
    }
    Ok(out)
}

fn format_share(count: usize, total: usize) -> String {
    if total == 0 {
        return "-".to_string();
    }
    format!("{:.1}%", count as f64 / total as f64 * 100.0)
}
