//! kubepark: runs the park, an attraction, or a single guest.
//!
//! Usage:
//!   kubepark park --mode hard --volume /data --self-url http://kubepark
//!   kubepark attraction --kind carousel --park-url http://kubepark --self-url http://carousel
//!   kubepark guest --park-url http://kubepark

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kubepark_core::{
    attraction::Attraction,
    config::{AttractionConfig, AttractionKind, GuestConfig, ParkConfig},
    guest::Guest,
    park::Park,
    state::Mode,
};
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "kubepark", about = "An amusement park simulated on a cluster")]
struct Cli {
    /// Default log filter; RUST_LOG overrides it.
    #[arg(long, global = true, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the park: ledger, HTTP API, and guest reconciliation loop.
    Park(ParkArgs),
    /// Run one attraction.
    Attraction(AttractionArgs),
    /// Make one visit to the park.
    Guest(GuestArgs),
}

#[derive(Args)]
struct ParkArgs {
    /// JSON config file; flags override it.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    mode: Option<Mode>,
    #[arg(long)]
    volume: Option<PathBuf>,
    #[arg(long)]
    closed: bool,
    #[arg(long)]
    entrance_fee: Option<f64>,
    #[arg(long)]
    opens_at: Option<u32>,
    #[arg(long)]
    closes_at: Option<u32>,
    /// Guest image. Without it guests run inside this process.
    #[arg(long)]
    image: Option<String>,
    #[arg(long)]
    self_url: Option<String>,
    #[arg(long)]
    namespace: Option<String>,
    #[arg(long)]
    listen: Option<String>,
    /// Comma-separated peer base URLs, instead of the cluster pod list.
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,
    #[arg(long)]
    track_guest_space: bool,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct AttractionArgs {
    #[arg(long, default_value = "carousel")]
    kind: AttractionKind,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    fee: Option<f64>,
    #[arg(long)]
    duration_ms: Option<u64>,
    #[arg(long)]
    build_cost: Option<f64>,
    #[arg(long)]
    repair_cost: Option<f64>,
    #[arg(long)]
    size: Option<f64>,
    #[arg(long)]
    park_url: Option<String>,
    #[arg(long)]
    self_url: Option<String>,
    #[arg(long)]
    volume: Option<PathBuf>,
    #[arg(long)]
    closed: bool,
    #[arg(long)]
    break_chance: Option<f64>,
    #[arg(long, default_value_t = 80)]
    port: u16,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct GuestArgs {
    #[arg(long)]
    park_url: Option<String>,
    /// Comma-separated attraction base URLs, instead of asking the park.
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,
    #[arg(long)]
    money: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    match cli.command {
        Command::Park(args) => run_park(args).await,
        Command::Attraction(args) => run_attraction(args).await,
        Command::Guest(args) => run_guest(args).await,
    }
}

async fn run_park(args: ParkArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ParkConfig::load(path)?,
        None => ParkConfig::default(),
    };
    if let Some(mode) = args.mode { config.mode = mode; }
    if args.volume.is_some() { config.volume = args.volume; }
    if args.closed { config.closed = true; }
    if let Some(fee) = args.entrance_fee { config.entrance_fee = fee; }
    if let Some(hour) = args.opens_at { config.opens_at = hour; }
    if let Some(hour) = args.closes_at { config.closes_at = hour; }
    if let Some(image) = args.image { config.image = image; }
    if let Some(url) = args.self_url { config.self_url = url; }
    if let Some(ns) = args.namespace { config.namespace = ns; }
    if let Some(addr) = args.listen { config.listen_addr = addr; }
    if !args.peers.is_empty() { config.peers = args.peers; }
    if args.track_guest_space { config.track_guest_space = true; }
    if args.seed.is_some() { config.seed = args.seed; }

    println!("KubePark: park");
    println!("  mode:      {:?}", config.mode);
    println!("  volume:    {}", config.volume.as_ref().map_or("(none)".into(), |v| v.display().to_string()));
    println!("  hours:     {}..{}", config.opens_at, config.closes_at);
    println!("  self url:  {}", config.self_url);
    println!();

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let park = Park::from_config(config).await.context("park failed to start")?;
    park.serve(listener, shutdown_signal()).await?;
    Ok(())
}

async fn run_attraction(args: AttractionArgs) -> Result<()> {
    let mut config = AttractionConfig::preset(args.kind);
    if let Some(name) = args.name { config.name = name; }
    if let Some(fee) = args.fee { config.fee = fee; }
    if let Some(ms) = args.duration_ms { config.duration_ms = ms; }
    if let Some(cost) = args.build_cost { config.build_cost = cost; }
    if let Some(cost) = args.repair_cost { config.repair_cost = cost; }
    if let Some(size) = args.size { config.size = size; }
    if let Some(url) = args.park_url { config.park_url = url; }
    if let Some(url) = args.self_url { config.self_url = url; }
    if args.volume.is_some() { config.volume = args.volume; }
    if args.closed { config.closed = true; }
    if let Some(p) = args.break_chance { config.break_chance = p; }
    if args.seed.is_some() { config.seed = args.seed; }
    config.listen_addr = format!("0.0.0.0:{}", args.port);

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let attraction = Attraction::load(config)?;
    log::info!(
        "Starting {} against {}",
        attraction.config().name,
        attraction.config().park_url
    );
    attraction
        .serve(listener, shutdown_signal())
        .await
        .context("attraction failed")?;
    Ok(())
}

async fn run_guest(args: GuestArgs) -> Result<()> {
    let mut config = GuestConfig::default();
    if let Some(url) = args.park_url { config.park_url = url; }
    if !args.peers.is_empty() { config.peers = args.peers; }
    if let Some(money) = args.money { config.money = money; }
    if args.seed.is_some() { config.seed = args.seed; }

    let report = Guest::new(config)?.run().await?;
    println!(
        "entered={} rides={} failed={} spent=${:.2}",
        report.entered, report.visits, report.failed_visits, report.spent
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}
