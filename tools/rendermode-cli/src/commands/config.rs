//! Show the effective configuration.

use rendermode_common::config::AppConfig;

pub fn run(config: &AppConfig, init: bool) -> anyhow::Result<()> {
    if init {
        config.save()?;
        println!("Wrote {}", AppConfig::path().display());
    } else {
        println!("# {}", AppConfig::path().display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
