pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "signoff",
    about = "Signoff operator CLI",
    long_about = "Inspect and maintain approval records: migrations, config inspection, readiness \
                  checks, record lookups, and on-demand timeout sweeps.",
    after_help = "Examples:\n  signoff doctor --json\n  signoff show A-7K3MQX\n  signoff list \
                  u-alice\n  signoff sweep"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, notification settings, DB connectivity and index health")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show one approval by code (A-XXXXXX) or by id")]
    Show {
        #[arg(help = "Approval code or record id")]
        reference: String,
    },
    #[command(about = "List approvals a user requested or was asked to approve, newest first")]
    List {
        #[arg(help = "User id")]
        user_id: String,
    },
    #[command(about = "Run one timeout sweep pass now and report what it did")]
    Sweep,
    #[command(about = "Delete an approval's primary record; its index entries are left dangling")]
    Purge {
        #[arg(help = "Approval record id")]
        id: String,
        #[arg(long, help = "Confirm the deletion")]
        yes: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Show { reference } => commands::show::run(&reference),
        Command::List { user_id } => commands::list::run(&user_id),
        Command::Sweep => commands::sweep::run(),
        Command::Purge { id, yes } => commands::purge::run(&id, yes),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
