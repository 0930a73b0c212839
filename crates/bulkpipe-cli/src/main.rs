//! 🚀 bulkpipe-cli — the front door, the bouncer, the maitre d' of bulkpipe.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//!
//! ```text
//! bulkpipe-cli [config.toml] [operations.ndjson | -]
//! ```
//!
//! 📦 Loads config, sets up logging, reads one tagged-JSON operation per line from
//! the file (or stdin), and lets the library do the heavy lifting. Like a manager. 🦆

use std::path::Path;

use anyhow::{Context, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🚀 main() — where it all begins. The "I pressed F5 and held my breath" moment.
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 RUST_LOG decides how chatty we are
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_arg = args.get(1).map(String::as_str).unwrap_or("bulkpipe.toml");
    // 🔧 no second arg, or "-", means stdin
    let input = args.get(2).map(String::as_str).filter(|arg| *arg != "-").map(Path::new);

    // 🔒 The config file is optional; env vars alone are a valid configuration
    let config_file = Path::new(config_arg);
    let config_file_if_it_exists = match config_file.try_exists()
        .context(format!("💀 Couldn't check whether the configuration file exists. Maybe it's a pwd/cwd thing with relative paths; an absolute path settles it. Was checking here: '{}'", config_file.display()))?
    {
        true => Some(config_file),
        false => None,
    };

    let app_config = bulkpipe::app_config::load_config(config_file_if_it_exists)
        .context("💀 In bulkpipe-cli, main, we couldn't load the configuration. Check the file and the BULKPIPE_* environment variables; `target_urls` is required.")?;

    // 🚀 SEND IT.
    let result = bulkpipe::run(app_config, input).await;

    if let Err(err) = result {
        error!("💀 error: {}", err);
        // 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
                || cause_str.contains("never got an answer")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like an endpoint isn't reachable. \
                Double-check every entry in target_urls is up and listening. \
                If you're using Docker, `docker ps` shows what's running and \
                `docker compose up -d` resurrects the rest. ☕"
            );
        }

        // 🗑️ Exit with prejudice.
        std::process::exit(1);
    }

    // ✅ Pop the champagne. 🍾
    Ok(())
}
