use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use mnemo_retention::memory::protection::ProtectionEntry;
use uuid::Uuid;

use crate::client::{AdminClient, ProtectedItems, UnprotectResponse};
use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, to_json};

#[derive(Parser)]
pub struct ProtectCommand {
    #[clap(help = "Item ID (UUID format)")]
    pub id: String,

    #[clap(long, help = "Why the item must stay where it is")]
    pub reason: String,
}

#[derive(Parser)]
pub struct UnprotectCommand {
    #[clap(help = "Item ID (UUID format)")]
    pub id: String,
}

#[derive(Parser)]
pub struct ProtectedCommand {
    #[clap(help = "Owner whose protected items to list")]
    pub owner: String,
}

impl ProtectCommand {
    pub async fn execute(&self, client: &AdminClient, format: OutputFormat) -> CliResult<()> {
        let id = Uuid::parse_str(&self.id)?;
        let entry = client.protect(id, &self.reason).await?;
        println!("{}", render_entry(&entry, format)?);
        Ok(())
    }
}

impl UnprotectCommand {
    pub async fn execute(&self, client: &AdminClient, format: OutputFormat) -> CliResult<()> {
        let id = Uuid::parse_str(&self.id)?;
        let response = client.unprotect(id).await?;
        println!("{}", render_unprotect(&response, format)?);
        Ok(())
    }
}

impl ProtectedCommand {
    pub async fn execute(&self, client: &AdminClient, format: OutputFormat) -> CliResult<()> {
        let listed = client.protected(&self.owner).await?;
        println!("{}", render_list(&listed, format)?);
        Ok(())
    }
}

pub fn render_entry(entry: &ProtectionEntry, format: OutputFormat) -> CliResult<String> {
    if format == OutputFormat::Json {
        return to_json(entry);
    }
    Ok(format!(
        "Protected {} ({}) since {}: {}",
        entry.item_id,
        entry.owner_id,
        format_timestamp(&entry.protected_since),
        entry.reason
    ))
}

pub fn render_unprotect(response: &UnprotectResponse, format: OutputFormat) -> CliResult<String> {
    if format == OutputFormat::Json {
        return to_json(response);
    }
    if response.was_protected {
        Ok(format!("Removed protection from {}", response.item_id))
    } else {
        Ok(format!("{} was not protected", response.item_id))
    }
}

pub fn render_list(listed: &ProtectedItems, format: OutputFormat) -> CliResult<String> {
    if format == OutputFormat::Json {
        return to_json(listed);
    }
    if listed.items.is_empty() {
        return Ok(format!("No protected items for {}", listed.owner_id));
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["#", "Item ID"]);
    for (n, id) in listed.items.iter().enumerate() {
        table.add_row([(n + 1).to_string(), id.to_string()]);
    }

    Ok(format!(
        "{table}\n\n{} protected items for {}",
        listed.items.len(),
        listed.owner_id
    ))
}
