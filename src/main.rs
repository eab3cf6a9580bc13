use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use colored::*;

use sysdash::commands;

fn build_cli() -> Command {
    Command::new("sysdash")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Background metric collection for a desktop system monitor")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("watch")
                .about("Poll processes and I/O rates, printing JSON lines until Ctrl+C")
                .arg(
                    Arg::new("fast-ms")
                        .long("fast-ms")
                        .value_name("MS")
                        .help("Interval of the CPU-only process update")
                        .value_parser(clap::value_parser!(u64).range(1..)),
                )
                .arg(
                    Arg::new("full-ms")
                        .long("full-ms")
                        .value_name("MS")
                        .help("Interval of the full refresh")
                        .value_parser(clap::value_parser!(u64).range(1..)),
                )
                .arg(
                    Arg::new("top")
                        .short('t')
                        .long("top")
                        .value_name("N")
                        .help("Number of processes to report")
                        .default_value("10")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .value_name("N")
                        .help("Exit after N full reports")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("snapshot")
                .about("Collect one system snapshot and print it as JSON")
                .arg(
                    Arg::new("pretty")
                        .short('p')
                        .long("pretty")
                        .help("Pretty-print the JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("scan")
                .about("Show the largest entries of a directory")
                .arg(
                    Arg::new("path")
                        .help("Directory to scan (defaults to current directory)")
                        .index(1),
                )
                .arg(
                    Arg::new("limit")
                        .short('l')
                        .long("limit")
                        .value_name("N")
                        .help("Number of entries to show")
                        .default_value("20")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("batch")
                        .short('b')
                        .long("batch")
                        .help("Scan each subdirectory as its own task")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Inspect or reset the configuration")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(Command::new("show").about("Print the effective configuration"))
                .subcommand(Command::new("path").about("Print the configuration file path"))
                .subcommand(Command::new("reset").about("Restore the default configuration")),
        )
}

fn main() -> Result<()> {
    sysdash::init_logging();

    let matches = build_cli().get_matches();

    let result = match matches.subcommand() {
        Some(("watch", sub_matches)) => commands::watch::execute(sub_matches),
        Some(("snapshot", sub_matches)) => commands::snapshot::execute(sub_matches),
        Some(("scan", sub_matches)) => commands::scan::execute(sub_matches),
        Some(("config", sub_matches)) => commands::config::execute(sub_matches),
        _ => {
            println!("Use 'sysdash --help' for more information.");
            Ok(())
        }
    };

    if let Err(ref err) = result {
        log::debug!("Command failed: {:?}", err);
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
    result
}
