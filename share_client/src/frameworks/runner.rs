// Framework bootstrap for the command-line share client.

use crate::domain::{LocationSource, SharingStatus, SystemClock};
use crate::frameworks::cli::Args;
use crate::frameworks::config;
use crate::interface_adapters::clients::HaukClient;
use crate::interface_adapters::location::{TrackLocationSource, TrackPoint};
use crate::interface_adapters::notifications::{LogNotifier, TerminalSurface};
use crate::interface_adapters::settings::StaticSettings;
use crate::use_cases::{SharingDeps, SharingManager, SharingTuning};

use clap::Parser;
use std::io::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run_with_config() -> Result<()> {
    // Load .env locally; safe to ignore when not present.
    let _ = dotenvy::dotenv();
    init_tracing();
    run(Args::parse()).await
}

// Start a share, keep it alive until it expires or the user interrupts, then stop it.
pub async fn run(args: Args) -> Result<()> {
    let settings = config::load_settings(args.config.as_deref()).map_err(Error::other)?;
    let interval = Duration::from_secs(settings.update_interval().into());
    let location = build_location_source(&args, interval)?;

    let http_timeout = config::http_timeout();
    let client = HaukClient::new(http_timeout)
        .map_err(|e| Error::other(format!("failed to initialize http client: {e}")))?;
    tracing::debug!(
        http_timeout_ms = http_timeout.as_millis(),
        update_interval_secs = interval.as_secs(),
        "share client configured"
    );

    let manager = SharingManager::spawn(
        SharingDeps {
            server: Arc::new(client),
            location,
            settings: Arc::new(StaticSettings::new(settings)),
            notifications: Arc::new(LogNotifier),
            visibility: Arc::new(TerminalSurface),
            clock: Arc::new(SystemClock),
        },
        SharingTuning {
            command_channel_capacity: config::COMMAND_CHANNEL_CAPACITY,
            max_inflight_uploads: config::MAX_INFLIGHT_UPLOADS,
            end_message_ttl: config::END_MESSAGE_TTL,
            stop_timeout: config::stop_timeout(),
        },
    );

    let share = manager
        .start_sharing(args.share_duration())
        .await
        .inspect_err(|err| {
            tracing::error!(
                error = %err,
                check_settings = err.routes_to_settings(),
                "failed to start sharing"
            );
        })
        .map_err(Error::other)?;

    println!("Sharing location at {}", share.share_url);
    if let Some(viewer_id) = &share.viewer_id {
        println!("Share ID: {viewer_id}");
    }
    let left = share
        .expiry
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    println!("Sharing for {} more minutes; press Ctrl-C to stop.", left.as_secs() / 60);

    let mut status = manager.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received; stopping share");
            manager.stop_sharing().await;
        }
        _ = status.wait_for(|status| !status.is_sharing()) => {}
    }

    report_end(&manager.status());
    Ok(())
}

fn build_location_source(args: &Args, interval: Duration) -> Result<Arc<dyn LocationSource>> {
    if let Some(path) = &args.track {
        let source = TrackLocationSource::from_path(path, interval).map_err(Error::other)?;
        return Ok(Arc::new(source));
    }

    match (args.latitude, args.longitude) {
        (Some(latitude), Some(longitude)) => Ok(Arc::new(TrackLocationSource::stationary(
            TrackPoint {
                latitude,
                longitude,
                accuracy: args.accuracy,
                speed: 0.0,
            },
            interval,
        ))),
        _ => Err(Error::other(
            "either --track or --latitude/--longitude is required",
        )),
    }
}

fn report_end(status: &SharingStatus) {
    if let Some(message) = &status.end_message {
        println!("{}: {}", message.title, message.body);
    }
    if let Some(err) = &status.last_error {
        tracing::warn!(error = %err, "last sharing error");
    }
}
