use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use light_scheduler_server::config::{Config, RawConfig};
use light_scheduler_server::control::UdpLight;
use light_scheduler_server::coordinator::Coordinator;
use light_scheduler_server::registry::Registry;
use light_scheduler_server::reports::{self, LightStates};
use light_scheduler_server::state::StateFile;
use light_scheduler_server::web;

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let raw_config = match RawConfig::load(&args.config) {
        Ok(val) => val,
        Err(e) => {
            println!("Error: Failed to load config: {:#}", e);
            println!();
            println!(
                "Example config:\n\n{}",
                toml::to_string(&RawConfig::example())?
            );
            return Ok(());
        }
    };
    let config: Config = raw_config.try_into()?;

    let state = Arc::new(StateFile::load(&config.server.state_file)?);
    let light_states = Arc::new(LightStates::default());
    let report_listener = reports::spawn_listener(&config.server.reports, light_states.clone())?;

    let mut registry = Registry::default();
    for light in &config.lights {
        let control = Arc::new(UdpLight::new(
            light.address.clone(),
            light.device_id,
            light_states.clone(),
        ));
        registry.insert(Coordinator::new(light, control, Some(state.clone())))?;
    }
    let registry = Arc::new(registry);

    for coordinator in registry.iter() {
        tokio::spawn(coordinator.clone().run());
    }
    info!(schedulers = registry.len(), "light scheduler running");

    let web_server = tokio::spawn(web::serve(
        config.server.listen.clone(),
        registry.clone(),
        config.server.static_dir.clone(),
    ));

    tokio::select! {
        res = web_server => res??,
        res = report_listener => res??,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
