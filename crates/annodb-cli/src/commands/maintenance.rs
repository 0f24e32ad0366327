//! Store maintenance

use anyhow::{Context, Result};

use annodb_core::Engine;

use crate::output::Output;

/// Repack the store file
pub fn vacuum(engine: &Engine, output: &Output) -> Result<()> {
    engine.vacuum().context("Failed to vacuum the store")?;
    output.success(&format!("Vacuumed {}", engine.store().target()));
    Ok(())
}
