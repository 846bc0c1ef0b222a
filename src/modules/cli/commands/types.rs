//! Types command implementation

use clap::Args;
use serde::Serialize;
use switchyard_types::ResourceType;

use super::print_json;

/// Types command arguments
#[derive(Args, Debug)]
pub struct TypesCommand {
    /// Print the list as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct TypeEntry {
    #[serde(rename = "type")]
    tag: &'static str,
    connector: &'static str,
    #[serde(rename = "virtual")]
    is_virtual: bool,
}

fn entries() -> Vec<TypeEntry> {
    ResourceType::all()
        .iter()
        .map(|t| TypeEntry {
            tag: t.as_str(),
            connector: t.family().as_str(),
            is_virtual: t.is_virtual(),
        })
        .collect()
}

impl TypesCommand {
    pub fn execute(&self) -> anyhow::Result<()> {
        let entries = entries();
        if self.json {
            return print_json(&entries, false);
        }

        for entry in &entries {
            if entry.is_virtual {
                println!("{:<16} (virtual)", entry.tag);
            } else if entry.tag != entry.connector {
                println!("{:<16} -> {}", entry.tag, entry.connector);
            } else {
                println!("{}", entry.tag);
            }
        }
        Ok(())
    }
}
