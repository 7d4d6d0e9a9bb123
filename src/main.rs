use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hivewatch::data::duration::format_duration;
use hivewatch::data::AlertEvent;
use hivewatch::{
    App, Backend, Clock, FileSource, FixtureHistory, HistorySource, HistoryWindow, LiveFeed,
    Metric, RangeSelector, Reading, Settings, Subscription, SystemClock, ThresholdClassifier,
};

#[derive(Parser, Debug)]
#[command(name = "hivewatch")]
#[command(about = "Evaluate, alert on and window hive sensor readings")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every evaluated snapshot as a JSON line
    Watch {
        /// Reading stream to connect to (host:port)
        #[arg(short, long, conflicts_with = "demo")]
        connect: Option<String>,

        /// Use generated demo readings
        #[arg(long)]
        demo: bool,

        /// Debounce and report danger alerts
        #[arg(long)]
        alerts: bool,
    },

    /// Print one metric of the windowed history as JSON lines
    History {
        /// Historical set as a JSON file
        #[arg(short, long, conflicts_with = "demo")]
        file: Option<PathBuf>,

        /// Use generated demo history
        #[arg(long)]
        demo: bool,

        /// Lookback range: Live, 24H, 7D, 15D, 30D (anything else means all)
        #[arg(short, long, default_value = "24H")]
        range: RangeSelector,

        /// temperature, humidity or air_purity
        #[arg(short, long, default_value = "temperature")]
        metric: Metric,
    },

    /// Classify a single online reading
    Classify {
        #[arg(long, allow_negative_numbers = true)]
        temperature: f64,

        #[arg(long)]
        humidity: f64,

        #[arg(long)]
        air_purity: f64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("{}={}", env!("CARGO_CRATE_NAME"), settings.logger.level).into()
        }))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Watch {
            connect,
            demo,
            alerts,
        } => run_watch(settings, connect, demo, alerts),
        Command::History {
            file,
            demo,
            range,
            metric,
        } => run_history(settings, file, demo, range, metric),
        Command::Classify {
            temperature,
            humidity,
            air_purity,
        } => run_classify(&settings, Reading::new(temperature, humidity, air_purity)),
    }
}

/// Drive the configured backend into a feed and print what it evaluates.
fn run_watch(settings: Settings, connect: Option<String>, demo: bool, alerts: bool) -> Result<()> {
    let mut backend = settings.backend.clone();
    if let Some(addr) = connect {
        backend.kind = Backend::Live;
        backend.connect = Some(addr);
    }
    if demo {
        backend.kind = Backend::Fixture;
    }
    let engine = settings.engine();
    let alerts = alerts || settings.alerts.enabled;

    info!(
        "Liveness window {}, alert cooldown {}",
        format_duration(engine.liveness_window),
        format_duration(engine.alert_cooldown)
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let feed = Arc::new(LiveFeed::new(engine, clock.clone()));
        let sources = backend.kind.open(&backend, clock).await?;
        let mut app = App::new(sources, feed.clone());

        let Subscription {
            snapshots,
            alerts,
            handle,
        } = feed.subscribe(alerts);
        let printer = tokio::spawn(print_snapshots(snapshots, alerts));

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, shutting down");
                let _ = stop_tx.send(true);
            }
        });

        app.run(backend.poll_interval, stop_rx).await;
        handle.cancel().await;
        printer.await?
    })
}

async fn print_snapshots(
    mut snapshots: mpsc::UnboundedReceiver<hivewatch::EvaluatedSnapshot>,
    mut alerts: Option<mpsc::UnboundedReceiver<AlertEvent>>,
) -> Result<()> {
    loop {
        tokio::select! {
            snapshot = snapshots.recv() => match snapshot {
                Some(snapshot) => println!("{}", serde_json::to_string(&snapshot)?),
                None => break,
            },
            alert = next_alert(&mut alerts) => match alert {
                Some(alert) => println!("{}", json!({ "alert": alert })),
                None => alerts = None,
            },
        }
    }
    Ok(())
}

async fn next_alert(alerts: &mut Option<mpsc::UnboundedReceiver<AlertEvent>>) -> Option<AlertEvent> {
    match alerts {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn run_history(
    settings: Settings,
    file: Option<PathBuf>,
    demo: bool,
    range: RangeSelector,
    metric: Metric,
) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let use_fixture = demo || (file.is_none() && settings.backend.kind == Backend::Fixture);

    let set = if use_fixture {
        FixtureHistory::new(clock.clone()).fetch()
    } else {
        let Some(path) = file.or(settings.backend.history_file) else {
            bail!("No history file: pass --file, --demo, or set backend.history_file");
        };
        let mut source = FileSource::new(&path);
        let set = source.fetch();
        if set.is_none() {
            let reason = source.error().unwrap_or("unavailable").to_string();
            return Err(anyhow!("{}: {}", source.description(), reason));
        }
        set
    }
    .unwrap_or_default();

    let window = HistoryWindow::new(range);
    let points = window.filter(&set, clock.now());
    if points.is_empty() {
        warn!("No entries within {}", range);
    }
    info!("{} of {} entries within {}", points.len(), set.len(), range);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for point in window.series(&points, metric) {
        writeln!(out, "{}", serde_json::to_string(&point)?)?;
    }
    Ok(())
}

fn run_classify(settings: &Settings, reading: Reading) -> Result<()> {
    let classifier = ThresholdClassifier::new(settings.thresholds);
    for metric in Metric::ALL {
        println!(
            "{:<18} {:>6.1}{:<2}  {}",
            metric.label(),
            metric.value(&reading),
            metric.unit(),
            classifier.classify_metric(metric, &reading, true).symbol()
        );
    }
    println!("{}", classifier.classify(&reading, true));
    Ok(())
}
