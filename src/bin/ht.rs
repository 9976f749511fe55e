// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! CLI tool for inspecting history tree files.

use clap::{Parser, Subcommand};
use history_tree::Config;
use std::path::PathBuf;
use std::process::ExitCode;

/// Read-only inspector for history tree files.
#[derive(Parser, Debug)]
#[command(name = "ht")]
#[command(about = "Read-only inspector for history tree files")]
struct Args {
    /// Path to the history tree file.
    path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print header fields and node count.
    Info,
    /// Run a full query at time `t` and print every populated quark.
    Query {
        /// Query timestamp.
        t: i64,
        /// Highest quark to check (exclusive upper bound).
        #[arg(long, default_value_t = 256)]
        quarks: usize,
    },
    /// Run a singular query for one quark at time `t`.
    Get {
        /// Query timestamp.
        t: i64,
        /// Attribute quark.
        quark: i32,
    },
    /// Print a single node's header and interval list.
    DumpNode {
        /// Node sequence number.
        seq: u32,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(args: Args) -> history_tree::Result<()> {
    let tree = Config::new(&args.path).open()?;

    match args.command {
        Command::Info => {
            println!("path: {}", tree.path().display());
            println!("start: {}", tree.get_start_time());
            println!("end: {}", tree.get_end_time());
            println!("block_size: {}", tree.block_size());
            println!("max_children: {}", tree.max_children());
            println!("provider_version: {}", tree.provider_version());
            println!("root_sequence: {}", tree.root_sequence());
            println!("node_count: {}", tree.node_count());
            println!("average_node_usage: {:.2}%", tree.average_node_usage()?);
        }
        Command::Query { t, quarks } => {
            let mut out = vec![None; quarks];
            tree.query_full(t, &mut out)?;
            for (quark, interval) in out.into_iter().enumerate() {
                if let Some(interval) = interval {
                    println!("quark {quark}: [{}, {}] = {:?}", interval.start, interval.end, interval.value);
                }
            }
        }
        Command::Get { t, quark } => match tree.query_singular(t, quark)? {
            Some(interval) => println!("[{}, {}] = {:?}", interval.start, interval.end, interval.value),
            None => println!("no interval for quark {quark} at time {t}"),
        },
        Command::DumpNode { seq } => {
            print!("{}", tree.describe_node(seq)?);
        }
    }

    Ok(())
}
