use crate::app::App;
use crate::cli::NextIdArgs;
use crate::database::ensure_schema;
use crate::id::IdParts;
use anyhow::{Context, Result};

pub async fn init_schema(app: &App) -> Result<()> {
    ensure_schema(&app.db)
        .await
        .context("Failed to create tables")?;
    println!("✅ Schema ready.");
    Ok(())
}

pub async fn next_id(app: &App, args: &NextIdArgs) -> Result<()> {
    for _ in 0..args.count {
        let id = app
            .ids
            .next_id(&args.prefix)
            .await
            .with_context(|| format!("Failed to mint id for prefix '{}'", args.prefix))?;
        let parts = IdParts::decompose(id);
        let created = parts
            .created_at(app.config.id.epoch_seconds)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<20} seq={:<10} at={}", id, parts.sequence, created);
    }
    Ok(())
}
