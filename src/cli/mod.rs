//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::app::App;
use crate::config::{CacheStrategy, Config};
use crate::telemetry::init_tracing;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "oxflash")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Use the in-process store instead of Redis"
    )]
    pub memory: bool,

    #[arg(long, global = true, help = "Print collected metrics before exiting")]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "init-schema", about = "Create the relational tables")]
    InitSchema,

    #[command(name = "publish-voucher", about = "Publish a seckill voucher and seed its stock")]
    PublishVoucher(PublishVoucherArgs),

    #[command(name = "warmup", about = "Pre-load shops into the cache with logical expiry")]
    Warmup(WarmupArgs),

    #[command(name = "catalog", about = "Read a shop through the cache")]
    Catalog(CatalogArgs),

    #[command(name = "seckill", about = "Submit seckill orders")]
    Seckill(SeckillArgs),

    #[command(name = "next-id", about = "Mint globally unique ids")]
    NextId(NextIdArgs),
}

#[derive(Parser, Debug)]
pub struct PublishVoucherArgs {
    #[arg(long, help = "Voucher id")]
    pub voucher_id: i64,

    #[arg(long, help = "Initial stock")]
    pub stock: i32,

    #[arg(long, default_value_t = 24, help = "Sale window length in hours")]
    pub hours: i64,
}

#[derive(Parser, Debug)]
pub struct WarmupArgs {
    #[arg(long, value_delimiter = ',', required = true, help = "Shop ids, comma separated")]
    pub ids: Vec<i64>,

    #[arg(long, default_value_t = 30 * 60, help = "Logical expiry in seconds")]
    pub expire_secs: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StrategyArg {
    PassThrough,
    Mutex,
    LogicalExpire,
}

impl From<StrategyArg> for CacheStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::PassThrough => CacheStrategy::PassThrough,
            StrategyArg::Mutex => CacheStrategy::Mutex,
            StrategyArg::LogicalExpire => CacheStrategy::LogicalExpire,
        }
    }
}

#[derive(Parser, Debug)]
pub struct CatalogArgs {
    #[arg(long, help = "Shop id")]
    pub id: i64,

    #[arg(long, value_enum, help = "Override the configured cache strategy")]
    pub strategy: Option<StrategyArg>,
}

#[derive(Parser, Debug)]
pub struct SeckillArgs {
    #[arg(long, help = "Voucher id")]
    pub voucher_id: i64,

    #[arg(long, default_value_t = 1, help = "First user id")]
    pub user_id: i64,

    #[arg(long, default_value_t = 1, help = "Number of concurrent users, ids counted up from --user-id")]
    pub users: u32,

    #[arg(long, help = "Publish the voucher with this stock first")]
    pub stock: Option<i32>,
}

#[derive(Parser, Debug)]
pub struct NextIdArgs {
    #[arg(long, default_value = "order", help = "Business prefix")]
    pub prefix: String,

    #[arg(long, default_value_t = 1, help = "How many ids to mint")]
    pub count: u32,
}

mod admin;
mod catalog;
mod seckill;

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config.telemetry).context("Failed to initialise tracing")?;

    let app = if cli.memory {
        App::in_memory(config).await
    } else {
        App::connect(config).await
    }
    .context("Failed to start application")?;

    let result = match &cli.command {
        Commands::InitSchema => admin::init_schema(&app).await,
        Commands::PublishVoucher(args) => seckill::publish(&app, args).await,
        Commands::Warmup(args) => catalog::warmup(&app, args).await,
        Commands::Catalog(args) => catalog::read(&app, args).await,
        Commands::Seckill(args) => seckill::execute(&app, args).await,
        Commands::NextId(args) => admin::next_id(&app, args).await,
    };

    app.shutdown().await.context("Failed to shut down cleanly")?;
    if cli.metrics {
        print!("{}", crate::metrics::get_metrics_string());
    }
    result
}
