//! modelops - Main Entry Point

use clap::Parser;
use modelops::cli::{cmd_run, cmd_versions, load_serving_state, Cli, Commands};
use modelops::serving::{run_server, ServerConfig};
use modelops::services::LoggerService;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { files, extra } => {
            // The job config carries its own logger settings
            cmd_run(&files, extra.as_deref())?;
        }
        Commands::Serve { uri, host, port } => {
            LoggerService::default().start();
            let state = load_serving_state(uri.as_deref())?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_server(ServerConfig { host, port }, state.clone()))?;
            // Blocking HTTP clients must not drop inside the runtime
            drop(runtime);
            drop(state);
        }
        Commands::Versions { name } => {
            LoggerService::default().start();
            cmd_versions(name.as_deref())?;
        }
    }

    Ok(())
}
