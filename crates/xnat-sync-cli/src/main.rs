//! xnat-sync - Main entry point

use clap::Parser;
use std::process;
use xnat_sync_cli::report::report;
use xnat_sync_cli::{commands, Cli, Commands, RoiCommand};
use xnat_sync_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};

#[tokio::main]
async fn main() {
    // Values from a .env file fill in unset XNAT_SYNC_* variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(ref command) = cli.command else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    let log_config = LogConfig::builder()
        .level(LogLevel::from_verbosity(cli.verbose))
        .output(LogOutput::Console)
        .build();

    // Environment variables take precedence over the -v count
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging, so setup failures are not fatal
    let _guard = init_logging(&log_config).ok().flatten();

    if let Err(e) = execute_command(&cli, command).await {
        report(&e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli, command: &Commands) -> xnat_sync_cli::Result<()> {
    let config = cli.config()?;

    match command {
        Commands::Roi {
            command: RoiCommand::Store(args),
        } => commands::roi::store(&config, args).await,
        Commands::Upload(args) => commands::upload::run(&config, args).await,
        Commands::Whoami => commands::whoami::run(&config).await,
    }
}
