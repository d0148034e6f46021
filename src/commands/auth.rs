// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::api::ApiClient;
use anyhow::{Context, Result};

pub fn handle(client: &ApiClient, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("login", sub)) => {
            let email = match sub.get_one::<String>("email") {
                Some(e) => e.trim().to_string(),
                None => client
                    .session()
                    .last_email()
                    .context("No --email given and no previously used email stored")?,
            };
            let password = sub.get_one::<String>("password").unwrap();
            let session = client
                .login(&email, password)
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Logged in as {}", session.email);
        }
        Some(("register", sub)) => {
            let email = sub.get_one::<String>("email").unwrap().trim();
            let password = sub.get_one::<String>("password").unwrap();
            match client.register(email, password)? {
                Some(s) => println!("Registered and logged in as {}", s.email),
                None => println!("Registered {}; confirm your email, then log in", email),
            }
        }
        Some(("forgot-password", sub)) => {
            let email = sub.get_one::<String>("email").unwrap().trim();
            println!("{}", client.forgot_password(email)?);
        }
        Some(("logout", _)) => {
            client.logout()?;
            println!("Logged out");
        }
        Some(("whoami", _)) => match client.session().get() {
            Some(s) => println!("{}", s.email),
            None => println!("Not logged in"),
        },
        _ => {}
    }
    Ok(())
}
