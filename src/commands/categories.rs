// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::store::SqliteStore;
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::Result;

pub fn handle(store: &mut SqliteStore, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            let color = sub.get_one::<String>("color").map(|s| s.as_str());
            store.add_category(name, color)?;
            println!("Added category '{}'", name);
        }
        Some(("list", sub)) => {
            let cats = store.list_categories()?;
            if !maybe_print_json(sub.get_flag("json"), &cats)? {
                let data = cats
                    .into_iter()
                    .map(|c| vec![c.name, c.color])
                    .collect();
                println!("{}", pretty_table(&["Category", "Color"], data));
            }
        }
        Some(("rm", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            if store.delete_category(name)? {
                println!("Removed category '{}'", name);
            } else {
                println!("No category named '{}'", name);
            }
        }
        _ => {}
    }
    Ok(())
}
