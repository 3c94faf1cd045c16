// # zonesync
//
// Thin composition root over zonesync-core:
// 1. Read settings from environment variables
// 2. Load the zone configuration file
// 3. Register provider factories
// 4. Preview or push every zone
//
// ## Configuration
//
// - `ZONESYNC_CONFIG`: path to the JSON zone configuration (required)
// - `ZONESYNC_MODE`: `preview` (default) or `push`
// - `ZONESYNC_LOG_LEVEL`: trace, debug, info (default), warn, error
// - `ZONESYNC_CLOUDFLARE_API_TOKEN`: used for Cloudflare providers whose
//   `api_token` is empty in the file
//
// ## Example
//
// ```bash
// export ZONESYNC_CONFIG=/etc/zonesync/zones.json
// export ZONESYNC_CLOUDFLARE_API_TOKEN=your_token
// export ZONESYNC_MODE=push
//
// zonesync
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use zonesync_core::config::{ProviderConfig, ReconcileConfig};
use zonesync_core::engine::{EngineEvent, Mode, ReconcileEngine, ZoneOutcome};
use zonesync_core::ProviderRegistry;

/// Exit codes
///
/// - 0: every zone reconciled (or previewed) cleanly
/// - 1: configuration error, or a zone rejected by validation
/// - 2: runtime error (provider failure, failed correction)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ZonesyncExitCode {
    Clean = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<ZonesyncExitCode> for ExitCode {
    fn from(code: ZonesyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Settings taken from the environment
struct Settings {
    config_path: String,
    mode: Mode,
    log_level: Level,
    cloudflare_api_token: Option<String>,
}

impl Settings {
    fn from_env() -> Result<Self> {
        let config_path = env::var("ZONESYNC_CONFIG").context(
            "ZONESYNC_CONFIG is required. \
            Set it via: export ZONESYNC_CONFIG=/path/to/zones.json",
        )?;

        let mode = match env::var("ZONESYNC_MODE") {
            Ok(value) => value.parse()?,
            Err(_) => Mode::Preview,
        };

        let log_level = env::var("ZONESYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            other => anyhow::bail!(
                "ZONESYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        };

        Ok(Self {
            config_path,
            mode,
            log_level,
            cloudflare_api_token: env::var("ZONESYNC_CLOUDFLARE_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
        })
    }

    /// Load the zone file and fill credentials from the environment
    fn load_config(&self) -> Result<ReconcileConfig> {
        let mut config = ReconcileConfig::from_file(&self.config_path)
            .with_context(|| format!("failed to load {}", self.config_path))?;

        for provider in config.providers.values_mut() {
            if let ProviderConfig::Cloudflare { api_token, .. } = provider
                && api_token.is_empty()
                && let Some(token) = &self.cloudflare_api_token
            {
                *api_token = token.clone();
            }
        }

        Ok(config)
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ZonesyncExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ZonesyncExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ZonesyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run(settings)).into()
}

async fn run(settings: Settings) -> ZonesyncExitCode {
    let config = match settings.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return ZonesyncExitCode::ConfigError;
        }
    };

    let mut registry = ProviderRegistry::new();
    zonesync_core::providers::register(&mut registry);
    #[cfg(feature = "cloudflare")]
    zonesync_provider_cloudflare::register(&mut registry);
    debug!("Registered provider types: {:?}", registry.list_providers());

    let (engine, mut events) = match ReconcileEngine::from_registry(&registry, &config) {
        Ok(built) => built,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ZonesyncExitCode::ConfigError;
        }
    };

    let event_log = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    info!(
        "Reconciling {} zone(s) in {} mode",
        config.zones.len(),
        settings.mode
    );

    let outcomes = engine.reconcile(&config, settings.mode).await;
    // Closing the channel ends the event logger
    drop(engine);
    if let Err(e) = event_log.await {
        warn!("Event logger task failed: {}", e);
    }

    match outcomes {
        Ok(outcomes) => report(&outcomes),
        Err(e) => {
            error!("Configuration error: {}", e);
            ZonesyncExitCode::ConfigError
        }
    }
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::CorrectionApplied { zone, message } => debug!("{}: applied {}", zone, message),
        other => debug!("Engine event: {:?}", other),
    }
}

/// Print per-zone results and pick the exit code
fn report(outcomes: &[ZoneOutcome]) -> ZonesyncExitCode {
    let mut code = ZonesyncExitCode::Clean;

    for outcome in outcomes {
        match outcome {
            ZoneOutcome::Failed { zone, error } => {
                error!("{}: {}", zone, error);
                code = code.max(if error.is_validation() {
                    ZonesyncExitCode::ConfigError
                } else {
                    ZonesyncExitCode::RuntimeError
                });
            }
            ZoneOutcome::Planned(plan) => {
                println!("******************** Domain: {}", plan.zone);
                for (i, correction) in plan.corrections.iter().enumerate() {
                    println!("#{}: {}", i + 1, correction.message);
                }
                println!("{} correction(s)", plan.corrections.len());
            }
            ZoneOutcome::Applied { plan, report } => {
                println!("******************** Domain: {}", plan.zone);
                for outcome in &report.outcomes {
                    match &outcome.result {
                        Ok(()) => println!("SUCCESS: {}", outcome.message),
                        Err(e) => println!("FAILURE: {} ({})", outcome.message, e),
                    }
                }
                if report.skipped > 0 {
                    println!("SKIPPED: {} correction(s)", report.skipped);
                }
                if !report.is_success() {
                    code = code.max(ZonesyncExitCode::RuntimeError);
                }
            }
        }
    }

    code
}
