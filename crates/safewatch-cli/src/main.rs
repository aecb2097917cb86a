mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use safewatch_core::capability::{ActivityFeed, Injected, OsThreads};
use safewatch_core::config::MonitorConfig;
use safewatch_core::watch::classify;
use safewatch_core::{Monitor, Providers};
use safewatch_proto::signal::{ActivityKind, ConnectionInfo};
use safewatch_sources::{doctor as sources_doctor, NmeaInput, NmeaPositions, ProbeConfig, TcpProbe};

#[derive(Debug, Parser)]
#[command(name = "safewatch", version, about = "SafeWatch - local inactivity & connectivity emergency monitor")]
struct Cli {
    /// TOML config; built-in defaults when omitted.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate config and sources.
    Doctor,
    /// Run the monitor. Stdin: `test` = manual trigger, `quit` = exit, anything else = activity.
    Run,
    /// Print the network tier for a metadata sample.
    Classify {
        #[arg(long)]
        effective_type: Option<String>,
        #[arg(long)]
        downlink: Option<f64>,
        #[arg(long)]
        rtt: Option<u32>,
    },
}

#[derive(Debug, Default, serde::Deserialize)]
struct Config {
    #[serde(default)]
    monitor: MonitorConfig,
    location: Option<NmeaInput>,
    network: Option<ProbeConfig>,
    #[serde(default)]
    heartbeat: HeartbeatCfg,
    #[serde(default)]
    ui: UiCfg,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct HeartbeatCfg {
    enable: bool,
}

impl Default for HeartbeatCfg {
    fn default() -> Self {
        Self { enable: true }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct UiCfg {
    status_interval_ms: u64,
    /// Treat stdin lines as key presses.
    stdin_activity: bool,
}

impl Default for UiCfg {
    fn default() -> Self {
        Self { status_interval_ms: 5_000, stdin_activity: true }
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else { return Ok(Config::default()); };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run => run(&cfg).await?,
        Command::Classify { effective_type, downlink, rtt } => {
            let sample = ConnectionInfo { effective_type, downlink_mbps: downlink, rtt_ms: rtt };
            println!("{}", classify(&sample, cfg.monitor.classification_order));
        }
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    cfg.monitor.validate().context("[monitor]")?;

    match &cfg.location {
        Some(input) => sources_doctor::check_nmea_input(input)?,
        None => warn!("doctor: no [location] source, location watcher will be disabled"),
    }
    match &cfg.network {
        Some(probe) => sources_doctor::check_probe(probe)?,
        None => warn!("doctor: no [network] probe, network tier will report unsupported"),
    }
    if !cfg.heartbeat.enable {
        warn!("doctor: heartbeat disabled");
    }
    anyhow::ensure!(cfg.ui.status_interval_ms >= 100, "ui.status_interval_ms too small");

    info!("doctor: OK");
    Ok(())
}

#[derive(Debug)]
enum UiCommand {
    ManualTest,
    Activity,
    Quit,
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting");
    cfg.monitor.validate().context("[monitor]")?;

    let (activity_tx, activity_rx) = mpsc::channel::<ActivityKind>(64);
    let mut providers = Providers::default();
    if let Some(input) = &cfg.location {
        providers.position = Box::new(NmeaPositions::new(input.clone()));
    }
    if let Some(probe_cfg) = &cfg.network {
        let probe = TcpProbe::spawn(probe_cfg.clone());
        providers.connection = Box::new(probe.clone());
        providers.online = Box::new(probe);
    }
    if cfg.ui.stdin_activity {
        providers.activity = Box::new(Injected::<ActivityFeed>::new(activity_rx));
    }
    if cfg.heartbeat.enable {
        providers.isolation = Box::new(OsThreads);
    }

    let monitor = Monitor::start(&cfg.monitor, providers);

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<UiCommand>(8);
    tokio::spawn(read_stdin(cmd_tx));
    let mut stdin_open = true;

    let mut panel = render::Panel::default();
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(cfg.ui.status_interval_ms.max(100)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res { warn!("run: ctrl-c handler failed: {:#}", e); }
                break;
            }
            _ = ticker.tick() => print!("{}", panel.render(&monitor.snapshot())),
            cmd = cmd_rx.recv(), if stdin_open => match cmd {
                Some(UiCommand::ManualTest) => {
                    if !monitor.trigger_manual_test() {
                        println!("(emergency already active, test ignored)");
                    }
                    print!("{}", panel.render(&monitor.snapshot()));
                }
                Some(UiCommand::Activity) => {
                    // Full buffer means plenty of recent activity already.
                    let _ = activity_tx.try_send(ActivityKind::KeyPress);
                }
                Some(UiCommand::Quit) => break,
                None => stdin_open = false,
            },
        }
    }

    monitor.shutdown().await;
    info!("run: stopped");
    Ok(())
}

async fn read_stdin(tx: mpsc::Sender<UiCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let cmd = match line.trim() {
            "test" => UiCommand::ManualTest,
            "quit" | "q" => UiCommand::Quit,
            _ => UiCommand::Activity,
        };
        if tx.send(cmd).await.is_err() {
            break;
        }
    }
}
