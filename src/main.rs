mod args;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use sinan_lib::agent_engine::state::SessionStatus;
use sinan_lib::commands;
use sinan_lib::config::{load_config, AppConfig};
use sinan_lib::device::manager::{DeviceDiscovery, DeviceRegistry, ShellDiscovery};
use sinan_lib::errors::SinanResult;

use crate::args::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
    sinan_lib::init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> SinanResult<ExitCode> {
    let config = load_config()?;
    let discovery: Arc<dyn DeviceDiscovery> = Arc::new(ShellDiscovery);
    let registry = DeviceRegistry::new(discovery.clone());

    let code = dispatch(cli, &config, discovery, &registry).await;
    registry.shutdown().await;
    code
}

async fn dispatch(
    cli: Cli,
    config: &AppConfig,
    discovery: Arc<dyn DeviceDiscovery>,
    registry: &DeviceRegistry,
) -> SinanResult<ExitCode> {
    match cli.command {
        Commands::Devices => commands::list_devices(registry).await?,
        Commands::Monitor => commands::monitor(discovery, config).await?,
        Commands::Exec(args) => {
            commands::exec_instruction(registry, config, &args.device, &args.instruction).await?;
        }
        Commands::Run(args) => {
            let status =
                commands::run_case(registry, config, &args.device, &args.case, args.keep_going)
                    .await?;
            if status != SessionStatus::Passed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Elements(args) => {
            commands::list_elements(args.platform.into(), &args.dump)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
