use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use mnemo_retention::memory::types::ItemSnapshot;
use uuid::Uuid;

use crate::client::AdminClient;
use crate::error::CliResult;
use crate::output::{OutputFormat, format_score, format_timestamp, to_json};

#[derive(Parser)]
pub struct ItemCommand {
    #[clap(help = "Item ID (UUID format)")]
    pub id: String,
}

impl ItemCommand {
    pub async fn execute(&self, client: &AdminClient, format: OutputFormat) -> CliResult<()> {
        let id = Uuid::parse_str(&self.id)?;
        let snapshot = client.item(id).await?;
        println!("{}", render(&snapshot, format)?);
        Ok(())
    }
}

pub fn render(snapshot: &ItemSnapshot, format: OutputFormat) -> CliResult<String> {
    if format == OutputFormat::Json {
        return to_json(snapshot);
    }

    let item = &snapshot.item;
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Field", "Value"]);

    let score = if snapshot.stale_score {
        format!("{} (stale)", format_score(item.score))
    } else {
        format_score(item.score)
    };
    let latency = snapshot
        .avg_retrieval_latency_ms
        .map(|ms| format!("{ms:.2} ms"))
        .unwrap_or_else(|| "-".to_string());

    let rows = [
        ("ID", item.id.to_string()),
        ("Owner", item.owner_id.clone()),
        ("Context", item.context_id.clone()),
        ("Tier", item.tier.to_string()),
        ("Score", score),
        ("Protected", yes_no(snapshot.protected)),
        ("Relevance", format_score(snapshot.relevance)),
        ("Emotional weight", format_score(snapshot.emotional_weight)),
        ("Accesses", item.access_count.to_string()),
        ("Hits / misses", format!("{} / {}", snapshot.hits, snapshot.misses)),
        ("Access frequency", format!("{:.2}/day", snapshot.access_frequency)),
        ("Avg latency", latency),
        ("Created", format_timestamp(&item.created_at)),
        ("Last accessed", format_timestamp(&item.last_accessed_at)),
        ("In tier since", format_timestamp(&item.tier_assigned_at)),
    ];
    for (field, value) in rows {
        table.add_row([field.to_string(), value]);
    }

    Ok(format!("{table}"))
}

fn yes_no(flag: bool) -> String {
    let label = if flag { "yes" } else { "no" };
    label.to_string()
}
