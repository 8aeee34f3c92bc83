//! `resolve` command: show what a URL would turn into, without connecting

use crate::config::DelegateConfig;
use crate::delegate::Resolution;
use crate::utils::parse_url;
use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// URL to resolve (a missing scheme means http)
    pub url: String,
}

impl ResolveArgs {
    pub async fn execute(&self, config: &DelegateConfig) -> Result<Resolution> {
        let url = parse_url(&self.url).with_context(|| format!("Invalid URL '{}'", self.url))?;
        let dispatcher = config
            .build_dispatcher()
            .context("Failed to build delegate dispatcher")?;

        debug!("Resolving {} against {} delegates", url, dispatcher.delegates().len());
        let resolution = dispatcher
            .resolve(&url)
            .await
            .with_context(|| format!("Failed to resolve {}", url))?;

        println!("url:         {}", url);
        println!("delegate:    {}", resolution.delegate.as_deref().unwrap_or("(none)"));
        println!("transformed: {}", resolution.transformed);
        println!("forwarded:   {}", resolution.forwarded);

        Ok(resolution)
    }
}
