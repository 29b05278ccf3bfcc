pub mod commands;
pub mod logging;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "boqtrack",
    about = "boqtrack operator CLI",
    long_about = "Operate the procurement ledger: migrations, config inspection, readiness \
                  checks, request reconciliation, order closure and duplicate screening.",
    after_help = "Examples:\n  boqtrack doctor --json\n  boqtrack reconcile --request-id <id>\n  \
                  boqtrack duplicates --site SITE-1 --start 2026-07-01T00:00:00Z \
                  --end 2026-07-15T00:00:00Z --material cement"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, database connectivity, and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Re-derive a request's fulfilment status from its quantity ledger")]
    Reconcile {
        #[arg(long, help = "Request id to reconcile")]
        request_id: String,
    },
    #[command(about = "Close a purchase order whose items are all delivered")]
    Close {
        #[arg(long, help = "Purchase order id to close")]
        purchase_order_id: String,
    },
    #[command(about = "List requests at a site whose planned window overlaps the given one")]
    Duplicates {
        #[arg(long, help = "Site id to screen")]
        site: String,
        #[arg(long, help = "Window start (RFC 3339)")]
        start: String,
        #[arg(long, help = "Window end (RFC 3339, exclusive)")]
        end: String,
        #[arg(long = "material", help = "Material name to compare; repeatable")]
        materials: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => {
            let doctor = commands::doctor::run(json);
            let exit_code = if doctor.passed { 0 } else { 1 };
            commands::CommandResult { exit_code, output: doctor.rendered }
        }
        Command::Reconcile { request_id } => commands::reconcile::run(&request_id),
        Command::Close { purchase_order_id } => commands::close::run(&purchase_order_id),
        Command::Duplicates { site, start, end, materials } => {
            commands::duplicates::run(&site, &start, &end, &materials)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
