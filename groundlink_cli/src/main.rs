mod cli;
mod error_fmt;
mod link;

use std::time::Duration;

use clap::Parser;
use groundlink_config::{Config, Logging};
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn rotation(name: Option<&str>) -> tracing_appender::rolling::Rotation {
    use tracing_appender::rolling::Rotation;
    match name.map(str::to_ascii_lowercase).as_deref() {
        Some("daily") => Rotation::DAILY,
        Some("hourly") => Rotation::HOURLY,
        _ => Rotation::NEVER,
    }
}

/// Console layer on stderr (pretty or JSON), plus an optional JSON-lines
/// file layer from `[logging]`. `RUST_LOG` overrides `--log-level`.
fn init_tracing(cli: &Cli, logging: Option<&Logging>) {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = logging.and_then(|l| {
        let path = std::path::Path::new(l.file.as_deref()?);
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(std::path::Path::new("."));
        let name = path.file_name()?;
        let appender = tracing_appender::rolling::RollingFileAppender::new(
            rotation(l.rotation.as_deref()),
            dir,
            name,
        );
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let level = l.level.as_deref().unwrap_or("info");
        let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter),
        )
    });

    let registry = tracing_subscriber::registry().with(file_layer);
    let result = if cli.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_filter(console_filter),
            )
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing init failed: {e}");
    }
}

fn dispatch(cli: &Cli, cfg: &Config) -> eyre::Result<()> {
    match &cli.cmd {
        Commands::Run {
            sim,
            cycles,
            sim_beacon_s,
        } => link::run_session(cfg, *sim, Duration::from_secs(*sim_beacon_s), *cycles, cli.json),
        Commands::PlanSetup { path, max_hex } => link::plan_setup(cfg, *path, *max_hex, cli.json),
        Commands::Encode {
            plan,
            path,
            max_hex,
            frames,
        } => link::encode_plan(cfg, plan, *path, *max_hex, *frames, cli.json),
        Commands::CheckConfig => {
            link::check_config(cfg, cli.json);
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("error hook install failed: {e}");
    }

    let cfg = link::load_config(&cli.config);
    init_tracing(&cli, cfg.as_ref().ok().map(|c| &c.logging));

    let result = cfg.and_then(|cfg| dispatch(&cli, &cfg));
    if let Err(err) = result {
        tracing::debug!(error = ?err, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}
