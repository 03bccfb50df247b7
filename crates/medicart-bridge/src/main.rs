//! Medicart Bridge
//!
//! Runs the device tool on behalf of browsers and collectors: serves device
//! streams over WebSocket and HTTP, or forwards a single session to a
//! collector in the foreground.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use medicart_bridge::server::{self, AppState, ServerConfig};
use medicart_bridge::sink::{ForwardIdentity, HttpForwardSink};
use medicart_bridge::subprocess::DeviceTool;
use medicart_bridge::supervisor::{ChannelId, Supervisor};
use medicart_core::DeviceKind;
use medicart_core::config::{Config, load_config};

#[derive(Parser, Debug)]
#[command(name = "medicart-bridge")]
#[command(version, about = "Medicart bridge - device tool to WebSocket/HTTP bridge")]
struct Args {
    /// Device tool executable (name on PATH or path)
    #[arg(long, global = true, env = "MEDICART_DEVICE_CLI")]
    device_cli: Option<String>,

    /// Camera tool executable (name on PATH or path)
    #[arg(long, global = true, env = "MEDICART_CAMERA_CLI")]
    camera_cli: Option<String>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, global = true, env = "MEDICART_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true, env = "MEDICART_LOG_JSON")]
    log_json: bool,

    /// Directory holding `.medicart/settings.json` (defaults to the current directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP/WebSocket server
    Serve {
        /// TCP bind address (defaults to 0.0.0.0 on the configured port)
        #[arg(long, env = "MEDICART_ADDR")]
        addr: Option<SocketAddr>,
    },
    /// Forward one device session to a collector until it ends or Ctrl+C
    Upload {
        /// Device kind: heartrate, nibp, glucose or temperature
        kind: DeviceKind,

        /// Collector URL
        #[arg(long, env = "MEDICART_FORWARD_URL")]
        url: Option<String>,

        /// Patient the readings belong to
        #[arg(long, env = "MEDICART_PATIENT_NAME")]
        patient: Option<String>,

        /// Clinic the patient belongs to
        #[arg(long, env = "MEDICART_CLINIC_NAME")]
        clinic: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _ = rustls::crypto::ring::default_provider().install_default();

    let project_dir = match &args.config_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Cannot determine working directory")?,
    };
    let mut config = load_config(Some(&project_dir))?;
    apply_args(&mut config, &args);

    let level = &config.server.log_level;
    medicart_core::tracing_init::init_tracing(
        &format!("medicart_bridge={level},medicart_core={level}"),
        args.log_json,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        device_cli = %config.tools.device_cli,
        "Starting medicart-bridge"
    );

    let supervisor = Supervisor::new(DeviceTool::from_config(&config.tools));

    match args.command {
        Command::Serve { addr } => serve(config, supervisor, addr).await,
        Command::Upload {
            kind,
            url,
            patient,
            clinic,
        } => {
            if let Some(url) = url {
                config.forward.url = Some(url);
            }
            if let Some(patient) = patient {
                config.forward.patient_name = Some(patient);
            }
            if let Some(clinic) = clinic {
                config.forward.clinic_name = Some(clinic);
            }
            upload(config, supervisor, kind).await
        }
    }
}

/// CLI flags override every config layer.
fn apply_args(config: &mut Config, args: &Args) {
    if let Some(device_cli) = &args.device_cli {
        config.tools.device_cli.clone_from(device_cli);
    }
    if let Some(camera_cli) = &args.camera_cli {
        config.tools.camera_cli.clone_from(camera_cli);
    }
    if let Some(level) = &args.log_level {
        config.server.log_level.clone_from(level);
    }
}

async fn serve(
    config: Config,
    supervisor: Supervisor,
    addr: Option<SocketAddr>,
) -> anyhow::Result<()> {
    let mut server_config = ServerConfig::from_config(&config);
    if let Some(addr) = addr {
        server_config = server_config.with_addr(addr);
    }

    let listener = server::bind(server_config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_config.addr))?;
    let state = AppState::new(server_config, supervisor.clone());

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let server_task = tokio::spawn(server::serve(listener, state, async move {
        server_shutdown.cancelled().await;
    }));

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // `true` unsets $NOTIFY_SOCKET so device tool processes don't inherit it.
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    let cancelled = supervisor.cancel_all();
    if cancelled > 0 {
        info!(sessions = cancelled, "Cancelled running sessions");
    }
    shutdown.cancel();

    match tokio::time::timeout(Duration::from_secs(10), server_task).await {
        Ok(result) => result??,
        Err(_) => warn!("Server did not stop in time"),
    }

    info!("Bridge stopped");
    Ok(())
}

async fn upload(config: Config, supervisor: Supervisor, kind: DeviceKind) -> anyhow::Result<()> {
    let url = config
        .forward
        .url
        .context("No collector URL: pass --url or set MEDICART_FORWARD_URL")?;
    let patient = config
        .forward
        .patient_name
        .context("No patient: pass --patient or set MEDICART_PATIENT_NAME")?;

    let sink = HttpForwardSink::new(
        url.clone(),
        ForwardIdentity::new(patient, config.forward.clinic_name),
        Duration::from_secs(config.forward.timeout_secs),
    )?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping upload");
            ctrl_c.cancel();
        }
    });

    info!(%url, kind = kind.label(), "Forwarding device readings");
    let report = supervisor
        .run(&ChannelId::upload(), kind, sink, Some(&cancel))
        .await?;

    info!(
        delivered = report.delivered,
        failed = report.failed,
        skipped = report.skipped,
        termination = ?report.termination,
        exit = %report.exit,
        "Upload finished"
    );
    if report.exit.is_error() {
        anyhow::bail!("Device tool {}", report.exit);
    }
    Ok(())
}
