//! `mqttwatch` -- MQTT device liveness probe.
//!
//! Connects to an MQTT broker, subscribes to the configured device topics,
//! listens for a bounded window, and reports over Telegram when the
//! devices have gone silent. One invocation is one probe; run it from
//! cron, e.g.:
//!
//! ```text
//! */15 * * * * /usr/local/bin/mqttwatch -f /etc/mqttwatch.toml check -t 120
//! ```
//!
//! Modes:
//! - `check` -- pass/fail probe; closes the window on the first message
//!   and alerts only when every topic stayed silent.
//! - `debug` -- listens for the full window and always sends a per-topic
//!   summary.
//!
//! A failed liveness check or an unreachable broker completes the
//! documented flow (verdict + notification) and exits normally; only
//! configuration and usage errors exit nonzero.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mqttwatch::cli::Cli;
use mqttwatch::config::MonitorConfig;
use mqttwatch::notify::TelegramNotifier;
use mqttwatch::report::LivenessReport;
use mqttwatch::session::MqttSession;
use mqttwatch::watch::{self, Mode};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mode = cli.command.mode();
    let window = cli.command.window();

    // Debug runs are interactive diagnostics; default to chattier logs.
    let default_filter = match mode {
        Mode::Check => "mqttwatch=info",
        Mode::Debug => "mqttwatch=debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match MonitorConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %cli.config.display(), error = %e, "Configuration error");
            std::process::exit(1);
        }
    };

    tracing::info!(
        broker = %config.mqtt.host,
        topics = config.topics.len(),
        window_secs = window.as_secs(),
        mode = ?mode,
        "Starting mqttwatch",
    );

    let mut session = MqttSession::new(&config.mqtt);
    let outcome = watch::run_window(&mut session, &config.topics, window, mode).await;
    let report = LivenessReport::from_window(&config.topics, &outcome);

    let notifier = TelegramNotifier::new(&config.telegram);
    match mode {
        Mode::Check => {
            if report.overall_success {
                tracing::info!("Successful check: at least one device is publishing");
            } else if let Err(e) = notifier.send(report.alert_message()).await {
                tracing::error!(error = %e, "Failed to send Telegram notification");
            }
        }
        Mode::Debug => {
            let summary = report.summary();
            println!("{summary}");
            if let Err(e) = notifier.send(&summary).await {
                tracing::error!(error = %e, "Failed to send Telegram notification");
            }
        }
    }
}
