use std::collections::BTreeMap;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use mnemo_retention::memory::types::StorageTier;

use crate::client::AdminClient;
use crate::error::CliResult;
use crate::output::{OutputFormat, to_json};

#[derive(Parser)]
pub struct DistributionCommand {
    #[clap(help = "Owner whose items to count")]
    pub owner: String,
}

impl DistributionCommand {
    pub async fn execute(&self, client: &AdminClient, format: OutputFormat) -> CliResult<()> {
        let counts = client.distribution(&self.owner).await?;
        println!("{}", render(&self.owner, &counts, format)?);
        Ok(())
    }
}

pub fn render(
    owner: &str,
    counts: &BTreeMap<StorageTier, usize>,
    format: OutputFormat,
) -> CliResult<String> {
    if format == OutputFormat::Json {
        return to_json(counts);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Tier", "Items"]);

    let mut total = 0;
    for tier in StorageTier::ALL {
        let count = counts.get(&tier).copied().unwrap_or(0);
        total += count;
        table.add_row([tier.to_string(), count.to_string()]);
    }

    Ok(format!(
        "Tier distribution for {owner}\n\n{table}\n\nTotal: {total} items"
    ))
}
