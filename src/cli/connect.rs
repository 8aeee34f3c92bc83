//! `connect` command: open a connection for a URL and report where it went

use crate::config::DelegateConfig;
use crate::connect::Proxy;
use crate::utils::{duration_to_ms, parse_url};
use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// URL to open (a missing scheme means http)
    pub url: String,

    /// Route through this proxy instead of the configured one
    /// (http://host:port or socks5://host:port)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Ignore any configured proxy and connect directly
    #[arg(long, conflicts_with = "proxy")]
    pub direct: bool,
}

/// What the `connect` command observed
#[derive(Debug, Clone)]
pub struct ConnectReport {
    pub forwarded: String,
    pub peer: String,
    pub proxy: Option<String>,
    pub elapsed_ms: u64,
}

impl ConnectArgs {
    /// Proxy to use: the flag wins over the configuration
    pub fn effective_proxy(&self, config: &DelegateConfig) -> Result<Option<Proxy>> {
        if self.direct {
            return Ok(None);
        }
        match &self.proxy {
            Some(proxy) => Ok(Some(
                Proxy::parse(proxy).with_context(|| format!("Invalid proxy '{}'", proxy))?,
            )),
            None => Ok(config.proxy().context("Invalid configured proxy")?),
        }
    }

    pub async fn execute(&self, config: &DelegateConfig) -> Result<ConnectReport> {
        let url = parse_url(&self.url).with_context(|| format!("Invalid URL '{}'", self.url))?;
        let proxy = self.effective_proxy(config)?;
        let dispatcher = config
            .build_dispatcher()
            .context("Failed to build delegate dispatcher")?;

        info!("🔌 Opening {}", url);
        let started = Instant::now();
        let connection = dispatcher
            .open(&url, proxy.as_ref())
            .await
            .with_context(|| format!("Failed to open {}", url))?;

        let report = ConnectReport {
            forwarded: connection.url().to_string(),
            peer: connection.peer().to_string(),
            proxy: connection.proxy().map(|p| p.to_string()),
            elapsed_ms: duration_to_ms(started.elapsed()),
        };

        println!("forwarded: {}", report.forwarded);
        println!("peer:      {}", report.peer);
        println!("via:       {}", report.proxy.as_deref().unwrap_or("direct"));
        println!("elapsed:   {}ms", report.elapsed_ms);

        Ok(report)
    }
}
