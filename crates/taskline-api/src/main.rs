//! `taskline-api` binary entrypoint.
//!
//! Loads configuration from environment variables and starts the HTTP
//! server over in-memory stores.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use anyhow::Result;

use taskline_api::config::Config;
use taskline_api::server::Server;
use taskline_core::observability::{LogFormat, init_logging};

fn choose_log_format(config: &Config) -> LogFormat {
    if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(choose_log_format(&config));

    if config.debug {
        tracing::warn!("debug mode: user identity comes from X-User-Id, state is in-memory only");
    }

    let server = Server::new(config);
    server.serve().await?;
    Ok(())
}
