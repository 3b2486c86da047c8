//! Prompt-driven conflict resolution.

use anyhow::{Context, Result};
use dialoguer::{Input, Select};

use bibsync_core::models::{ConflictUnit, MergeResult, ResolutionMap, Side, ENTRY_TYPE_FIELD};

use crate::report::display_value;
use crate::style;

/// Ask for a value for every conflict of `result`.
pub fn prompt_resolutions(result: &MergeResult) -> Result<ResolutionMap> {
    let mut map = ResolutionMap::new();
    let total = result.conflicts.len();

    for (i, conflict) in result.conflicts.iter().enumerate() {
        println!();
        println!(
            "{}",
            style::header(&format!("Conflict {}/{}: {}", i + 1, total, conflict.target()))
        );

        match conflict {
            ConflictUnit::Field {
                key,
                field,
                base,
                local,
                remote,
            } => {
                let mut items = vec![
                    format!("local   {}", display_value(local.as_deref())),
                    format!("remote  {}", display_value(remote.as_deref())),
                    format!("base    {}", display_value(base.as_deref())),
                    "enter a new value".to_string(),
                ];
                if field != ENTRY_TYPE_FIELD {
                    items.push("remove the field".to_string());
                }

                let choice = Select::new()
                    .with_prompt(format!("Value for {}", field))
                    .items(&items)
                    .default(0)
                    .interact()
                    .context("failed to read selection")?;

                let value = match choice {
                    0 => local.clone(),
                    1 => remote.clone(),
                    2 => base.clone(),
                    3 => {
                        let typed: String = Input::new()
                            .with_prompt(format!("{}.{}", key, field))
                            .interact_text()
                            .context("failed to read value")?;
                        Some(typed)
                    }
                    _ => None,
                };
                map.resolve_field(key.clone(), field, value);
            }

            ConflictUnit::ModifyDelete {
                key, deleted_by, ..
            } => {
                let editor = if *deleted_by == Side::Local {
                    Side::Remote
                } else {
                    Side::Local
                };
                let items = [
                    format!("keep the entry ({} modified it)", editor),
                    format!("delete the entry ({} deleted it)", deleted_by),
                ];
                let choice = Select::new()
                    .with_prompt(format!("Entry {}", key))
                    .items(&items)
                    .default(0)
                    .interact()
                    .context("failed to read selection")?;
                if choice == 0 {
                    map.keep_record(key.clone());
                } else {
                    map.delete_record(key.clone());
                }
            }

            ConflictUnit::Section {
                section,
                base,
                local,
                remote,
            } => {
                for (label, blocks) in [("local", local), ("remote", remote), ("base", base)] {
                    println!("{}", style::dim(&format!("--- {} ---", label)));
                    for block in blocks {
                        println!("{}", block);
                    }
                }
                let choice = Select::new()
                    .with_prompt(format!("Keep which {}?", section))
                    .items(&["local", "remote", "base"])
                    .default(0)
                    .interact()
                    .context("failed to read selection")?;
                let blocks = match choice {
                    0 => local,
                    1 => remote,
                    _ => base,
                };
                map.resolve_section(*section, blocks.clone());
            }
        }
    }

    Ok(map)
}
