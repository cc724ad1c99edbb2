//! SaveContext data store CLI entry point.

use clap::Parser;
use colored::Colorize;
use scstore::cli::commands;
use scstore::cli::{Cli, Commands};
use scstore::error::Error;
use std::io::IsTerminal;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    if cli.no_color || !std::io::stderr().is_terminal() {
        colored::control::set_override(false);
    }

    // JSON when asked for, or when stdout is piped
    let json = cli.json || !std::io::stdout().is_terminal();

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e, json);
            ExitCode::from(e.exit_code())
        }
    }
}

fn report_error(e: &Error, json: bool) {
    if json {
        eprintln!("{}", e.to_structured_json());
        return;
    }
    eprintln!("{} {e}", "Error:".red().bold());
    if let Some(hint) = e.hint() {
        eprintln!("  {} {hint}", "Hint:".yellow());
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    match &cli.command {
        Commands::Init => commands::init::execute(cli, json),
        Commands::Projects { command } => commands::projects::execute(command, cli, json),
        Commands::Sessions { command } => commands::sessions::execute(command, cli, json),
        Commands::Issues { command } => commands::issues::execute(command, cli, json),
        Commands::Stats { project } => commands::stats::execute(project.as_deref(), cli, json),
        Commands::Status { command } => commands::status::execute(command.as_ref(), cli, json),
        Commands::Completions { shell } => commands::completions::execute(*shell),
    }
}
