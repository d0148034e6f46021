// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, value_parser};

fn json_flag() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print JSON instead of a table")
}

pub fn build_cli() -> Command {
    Command::new("spendsync")
        .version(clap::crate_version!())
        .about("Expense tracking with local storage and cloud sync")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Increase log verbosity (-v info, -vv debug)"),
        )
        .subcommand(Command::new("init").about("Create the local database"))
        .subcommand(
            Command::new("category")
                .about("Manage categories")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("color").long("color").help("Hex color, e.g. #FF8800")),
                )
                .subcommand(Command::new("list").arg(json_flag()))
                .subcommand(Command::new("rm").arg(Arg::new("name").required(true))),
        )
        .subcommand(
            Command::new("tx")
                .about("Record and list income and expenses")
                .subcommand(
                    Command::new("add")
                        .arg(
                            Arg::new("type")
                                .long("type")
                                .required(true)
                                .value_parser(["income", "expense"]),
                        )
                        .arg(Arg::new("amount").long("amount").required(true))
                        .arg(Arg::new("date").long("date").required(true))
                        .arg(
                            Arg::new("description")
                                .long("description")
                                .default_value(""),
                        )
                        .arg(
                            Arg::new("category")
                                .long("category")
                                .action(ArgAction::Append),
                        ),
                )
                .subcommand(
                    Command::new("list")
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_parser(value_parser!(usize)),
                        )
                        .arg(json_flag()),
                )
                .subcommand(
                    Command::new("rm").arg(
                        Arg::new("id")
                            .required(true)
                            .value_parser(value_parser!(i64)),
                    ),
                ),
        )
        .subcommand(
            Command::new("auth")
                .about("Sign in to the sync server")
                .subcommand(
                    Command::new("login")
                        .arg(Arg::new("email").long("email"))
                        .arg(Arg::new("password").long("password").required(true)),
                )
                .subcommand(
                    Command::new("register")
                        .arg(Arg::new("email").long("email").required(true))
                        .arg(Arg::new("password").long("password").required(true)),
                )
                .subcommand(
                    Command::new("forgot-password")
                        .arg(Arg::new("email").long("email").required(true)),
                )
                .subcommand(Command::new("logout"))
                .subcommand(Command::new("whoami")),
        )
        .subcommand(
            Command::new("sync")
                .about("Synchronize with the cloud")
                .subcommand(Command::new("upload").arg(json_flag()))
                .subcommand(Command::new("download").arg(json_flag()))
                .subcommand(Command::new("full").arg(json_flag()))
                .subcommand(Command::new("status").arg(json_flag())),
        )
        .subcommand(
            Command::new("job")
                .about("Server-side sync jobs")
                .subcommand(
                    Command::new("watch")
                        .arg(Arg::new("id").required(true))
                        .arg(
                            Arg::new("interval_ms")
                                .long("interval-ms")
                                .value_parser(value_parser!(u64)),
                        ),
                ),
        )
}
