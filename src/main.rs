use std::panic;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::config::{Backend, Config};
use crate::core::service::ExecutionService;
use crate::core::traits::isolation::IsolationRunner;
use crate::docker::runner::DockerRunner;
use crate::http::AppState;
use crate::native::runner::NativeRunner;
use crate::store::memory::InMemorySnippetStore;

mod config;
mod constants;
mod core;
mod docker;
mod http;
mod native;
mod store;
#[cfg(test)]
mod stubs;

#[tokio::main]
#[tracing::instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    set_panic_hook();

    let config = Config::from_env()?;
    tracing::info!(?config, "loaded configuration");

    let runner: Arc<dyn IsolationRunner> = match config.backend {
        Backend::Docker => Arc::new(DockerRunner::new(
            &config.docker_bin,
            &config.image,
            &config.scratch_dir,
        )),
        Backend::Native => Arc::new(NativeRunner::new(&config.scratch_dir)),
    };
    let state = AppState {
        service: Arc::new(ExecutionService::new(runner, config.execution_timeout)),
        store: Arc::new(InMemorySnippetStore::new()),
    };

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("HTTP server listening on port {}", config.port);
    axum::serve(listener, http::router(state)).await?;

    Ok(())
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
