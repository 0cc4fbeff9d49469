use crate::app::App;
use crate::catalog::Shop;
use crate::cli::{CatalogArgs, WarmupArgs};
use anyhow::{Context, Result};
use std::time::Duration;

pub async fn warmup(app: &App, args: &WarmupArgs) -> Result<()> {
    println!("Warming {} shops...", args.ids.len());
    let warmed = app
        .catalog
        .warmup(&args.ids, Duration::from_secs(args.expire_secs))
        .await
        .context("Warmup failed")?;
    println!("✅ Warmed {}/{} shops.", warmed, args.ids.len());
    Ok(())
}

pub async fn read(app: &App, args: &CatalogArgs) -> Result<()> {
    let strategy = args
        .strategy
        .map(Into::into)
        .unwrap_or_else(|| app.catalog.strategy());
    let shop = app
        .catalog
        .read_with(strategy, args.id)
        .await
        .with_context(|| format!("Failed to read shop {}", args.id))?;

    match shop {
        Some(shop) => display_shop(&shop),
        None => println!("Shop {} not found ({:?}).", args.id, strategy),
    }
    Ok(())
}

fn display_shop(shop: &Shop) {
    println!("=== Shop {} ===", shop.id);
    println!("Name:       {}", shop.name);
    println!("Area:       {}", shop.area);
    println!("Address:    {}", shop.address);
    println!("Avg price:  {}", shop.avg_price);
    println!("Score:      {:.1}", shop.score as f64 / 10.0);
    println!("Open hours: {}", shop.open_hours);
}
