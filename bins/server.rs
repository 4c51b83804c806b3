use std::process::ExitCode;

use configs::{AppConfig, ServerConfig};
use dotenvy::dotenv;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};
use uuid::Uuid;

const SERVICE: &str = "list_api";

/// 进程级 panic 日志，带上实例标识便于在聚合日志中定位
fn install_panic_hook(instance: Uuid) {
    std::panic::set_hook(Box::new(move |info| {
        error!(service = SERVICE, event = "panic", %instance, message = %info, "unhandled panic");
    }));
}

fn build_runtime(server: &ServerConfig) -> std::io::Result<Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("list-api-worker");
    if let Some(threads) = server.worker_threads {
        builder.worker_threads(threads);
    }
    builder.build()
}

/// Resolves on Ctrl+C; if the signal handler cannot be installed, never resolves.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(service = SERVICE, event = "shutdown_signal", "draining in-flight requests"),
        Err(e) => {
            warn!(service = SERVICE, event = "signal_unavailable", error = %e, "Ctrl+C handler not installed");
            std::future::pending::<()>().await;
        }
    }
}

fn main() -> ExitCode {
    // .env 需先于日志初始化加载（RUST_LOG / LOG_FORMAT）
    dotenv().ok();
    common::utils::logging::init_logging_from_env();

    let instance = Uuid::new_v4();
    install_panic_hook(instance);

    let cfg = match AppConfig::load_and_validate() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(service = SERVICE, event = "config_invalid", error = %e, "refusing to start");
            return ExitCode::FAILURE;
        }
    };
    if !cfg.store.is_configured() {
        warn!(service = SERVICE, event = "store_unconfigured", "GITHUB_TOKEN not set; list endpoints answer 500");
    }

    let rt = match build_runtime(&cfg.server) {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = SERVICE, event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(
        service = SERVICE,
        event = "start",
        %instance,
        pid = std::process::id(),
        version = env!("CARGO_PKG_VERSION"),
        backend = ?cfg.store.backend,
        "starting"
    );

    match rt.block_on(server::serve(&cfg, shutdown_signal())) {
        Ok(()) => {
            info!(service = SERVICE, event = "stop", %instance, "stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(service = SERVICE, event = "serve_failed", %instance, error = %e, "server exited with error");
            ExitCode::FAILURE
        }
    }
}
