//! bandboard backend: config loading, store restore, HTTP + websocket server, persistence.
pub mod api;
pub mod config;
pub mod persist;
pub mod server;
pub mod state;
pub mod sync_ws;

use crate::persist::Persister;
use crate::state::AppState;
use bandboard_core::clock::SystemClock;
use bandboard_core::store::persist::load_store;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "BANDBOARD_CONFIG";

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    let config = config::load_config(&config_path);

    let data_file = config.data_file();
    let store = load_store(&data_file)?;
    log::info!("Loaded store from {}", data_file.display());

    let persister = Persister::new(store.clone(), &data_file);
    let flush_every = config.flush_interval();
    let state = AppState::new(store, Arc::new(SystemClock), config);

    server::spawn_server(state).await?;
    let flusher = persister.clone().spawn(flush_every);

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    flusher.abort();
    match persister.flush() {
        Ok(true) => log::info!("Final flush written to {}", data_file.display()),
        Ok(false) => {}
        Err(e) => log::error!("Final flush failed: {}", e),
    }
    Ok(())
}
