//! `rulesync` binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rulesync_cli::cli::{Cli, Commands, LogFormat};
use rulesync_cli::commands::{
    ContactPointsCommand, NotificationPoliciesCommand, PlanCommand, SyncCommand,
};
use rulesync_cli::output::OutputFormat;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<(), rulesync_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let client = rulesync_cli::connect(&cli)?;
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Commands::Sync(args) => {
            let cmd = SyncCommand::new(&client);
            cmd.execute(&mut stdout, &format, args).await?;
        }
        Commands::Plan(args) => {
            let cmd = PlanCommand::new(&client);
            cmd.execute(&mut stdout, &format, args).await?;
        }
        Commands::ContactPoints(args) => {
            let cmd = ContactPointsCommand::new(&client);
            cmd.execute(&mut stdout, &format, args).await?;
        }
        Commands::NotificationPolicies(args) => {
            let cmd = NotificationPoliciesCommand::new(&client);
            cmd.execute(&mut stdout, &format, args).await?;
        }
    }

    Ok(())
}
