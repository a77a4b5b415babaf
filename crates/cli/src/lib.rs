pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "copilot",
    about = "Copilot operator CLI",
    long_about = "Check copilot runtime readiness, inspect effective configuration, and dry-run the read-only query guard.",
    after_help = "Examples:\n  copilot doctor --json\n  copilot config\n  copilot check-query \"SELECT * FROM promo\" --limit 20"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config, agent map completeness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Run a query through the guard and print the capped SQL or the rejection")]
    CheckQuery {
        #[arg(help = "SQL text as the data-fetch agent would propose it")]
        sql: String,
        #[arg(long, help = "Row cap to apply instead of guard.default_row_limit")]
        limit: Option<u32>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Config => commands::CommandResult { exit_code: 0, output: commands::config::run() },
        Command::CheckQuery { sql, limit } => commands::check_query::run(&sql, limit),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
