use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use mnemo_retention::optimizer::{OptimizationRunReport, RunStatus};

use crate::client::AdminClient;
use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, to_json};

#[derive(Parser)]
pub struct OptimizeCommand {
    #[clap(long, help = "Limit the pass to one owner's items")]
    pub owner: Option<String>,
}

impl OptimizeCommand {
    pub async fn execute(&self, client: &AdminClient, format: OutputFormat) -> CliResult<()> {
        let report = client.optimize(self.owner.as_deref()).await?;
        println!("{}", render(&report, format)?);
        Ok(())
    }
}

pub fn status_label(status: &RunStatus) -> String {
    match status {
        RunStatus::Completed => "completed".to_string(),
        RunStatus::Cancelled => "cancelled".to_string(),
        RunStatus::Failed { reason } => format!("failed: {reason}"),
        RunStatus::AlreadyRunning => "skipped, a pass is already running".to_string(),
    }
}

pub fn render(report: &OptimizationRunReport, format: OutputFormat) -> CliResult<String> {
    if format == OutputFormat::Json {
        return to_json(report);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Field", "Value"]);

    let scope = report.owner_id.as_deref().unwrap_or("all owners");
    let rows = [
        ("Run", report.run_id.to_string()),
        ("Scope", scope.to_string()),
        ("Started", format_timestamp(&report.started_at)),
        ("Duration", format!("{} ms", report.duration_ms)),
        ("Status", status_label(&report.status)),
        ("Examined", report.items_examined.to_string()),
        ("Stale scores", report.stale_scores.to_string()),
        ("Decayed", report.decayed.to_string()),
        ("Demotions", report.demotions.to_string()),
        ("Promotions", report.promotions.to_string()),
        ("Migrations", report.migrations_performed.to_string()),
        ("Failed migrations", report.migrations_failed.to_string()),
    ];
    for (field, value) in rows {
        table.add_row([field.to_string(), value]);
    }

    Ok(format!("{table}"))
}
