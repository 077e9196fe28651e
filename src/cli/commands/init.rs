//! Init command handler

use std::path::Path;

use crate::config::{Config, generate_hmac_key};

pub fn cmd_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    let mut config = Config::default();
    config.qr.hmac_key = Some(generate_hmac_key());
    config.validate()?;
    config.save_to_path(path)?;

    println!("✓ Wrote {}", path.display());
    println!("  Keep qr.hmac_key secret; tokens signed with it are accepted by every node.");

    Ok(())
}
