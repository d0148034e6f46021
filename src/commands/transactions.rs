// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::TransactionKind;
use crate::store::SqliteStore;
use crate::utils::{maybe_print_json, parse_date, parse_decimal, pretty_table};
use anyhow::{Result, anyhow};

pub fn handle(store: &mut SqliteStore, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(store, sub)?,
        Some(("list", sub)) => list(store, sub)?,
        Some(("rm", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            if store.delete_transaction(id)? {
                println!("Removed transaction {}", id);
            } else {
                println!("No transaction with id {}", id);
            }
        }
        _ => {}
    }
    Ok(())
}

fn add(store: &mut SqliteStore, sub: &clap::ArgMatches) -> Result<()> {
    let kind: TransactionKind = sub
        .get_one::<String>("type")
        .unwrap()
        .parse()
        .map_err(|e: String| anyhow!(e))?;
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let description = sub.get_one::<String>("description").unwrap().trim();

    let mut category_ids = Vec::new();
    if let Some(names) = sub.get_many::<String>("category") {
        for name in names {
            category_ids.push(store.category_id(name)?);
        }
    }

    let id = store.add_transaction(kind, amount, description, &date, &category_ids)?;
    println!("Recorded {} {} on {} (id {})", kind, amount, date, id);
    Ok(())
}

fn list(store: &SqliteStore, sub: &clap::ArgMatches) -> Result<()> {
    let limit = sub.get_one::<usize>("limit").copied();
    let data = store.list_transactions(limit)?;
    if !maybe_print_json(sub.get_flag("json"), &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.date.clone(),
                    r.kind.clone(),
                    r.amount.clone(),
                    r.categories.join(", "),
                    r.description.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["ID", "Date", "Type", "Amount", "Categories", "Description"],
                rows,
            )
        );
    }
    Ok(())
}
