// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! `hubd`: a control-plane node. Loads its config, brings up whatever is already on disk under
//! `config_root`, and serves the HTTP surface until it receives a shutdown signal.

mod config;
mod startup;

use clap::Parser;
use cplane_telemetry::{otel_error, otel_info};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// A control-plane node for a clustered security data-pipeline hub.
#[derive(Parser, Debug)]
#[command(name = "hubd", version, about)]
struct Cli {
    /// Path to the node's TOML config file.
    #[arg(long, env = "HUBD_CONFIG")]
    config: std::path::PathBuf,

    /// Console log format. File-backed logs are always JSON-lines regardless of this setting.
    #[arg(long, value_enum, env = "HUBD_LOG_FORMAT", default_value = "pretty")]
    log_format: config::CliLogFormat,
}

// Nothing can be logged through `cplane-telemetry` until a config file names a log directory, so
// the handful of failures that can happen before that point go straight to stderr.
#[allow(clippy::print_stderr)]
fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cfg = match config::Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("startup error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_format = match cli.log_format {
        config::CliLogFormat::Pretty => cplane_telemetry::LogFormat::Pretty,
        config::CliLogFormat::Json => cplane_telemetry::LogFormat::Json,
    };

    let log_path = cfg.log_dir.join("hub.log");
    let telemetry_guard = match cplane_telemetry::init_with_file(log_format, &log_path) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("startup error: failed to set up logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let exit_code = runtime.block_on(run(cfg));
    drop(telemetry_guard);
    exit_code
}

async fn run(cfg: config::Config) -> ExitCode {
    otel_info!("hubd.starting", node = %cfg.self_address, is_leader = cfg.is_leader);

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    match startup::run_node(cfg, cancel).await {
        Ok(()) => {
            otel_info!("hubd.shutdown_complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            otel_error!("hubd.startup_failed", error = %e);
            ExitCode::FAILURE
        }
    }
}

/// Cancels `cancel` on SIGINT (all platforms) or SIGTERM (unix).
fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sig) => sig,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    cancel.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = sigterm.recv() => {},
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        cancel.cancel();
    });
}
