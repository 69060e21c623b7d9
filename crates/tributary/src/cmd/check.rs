//! Check command - Validate a configuration file

use std::path::Path;

use anyhow::{Context, Result};
use tributary_config::Config;

/// Run the check command
pub fn run(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        anyhow::bail!("no configuration file given, pass one with --config <path>");
    };

    let config = Config::from_file(path)
        .with_context(|| format!("invalid configuration: {}", path.display()))?;

    println!("{}: ok", path.display());
    print!("{}", summary(&config));
    Ok(())
}

fn summary(config: &Config) -> String {
    let s = &config.streaming;
    format!(
        "  streaming: {} (delay {:?}, initial delay {:?}, pool {})\n  \
         batches: {} bytes, {} in flight, retry budget {}\n  \
         metrics: {}\n",
        if s.enabled { "enabled" } else { "disabled" },
        s.delay,
        s.initial_delay,
        s.pool_size,
        s.max_batch_bytes,
        s.max_in_flight,
        s.retry_budget,
        match config.metrics.report_interval() {
            Some(interval) => format!("every {interval:?}"),
            None => "off".to_string(),
        },
    )
}
