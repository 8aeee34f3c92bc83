//! Delegate configuration settings

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::connect::{Proxy, TcpOpener};
use crate::delegate::{Dispatcher, RewriteDelegate, RewriteRule, SelectionPolicy};
use crate::error::{Error, Result};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Main configuration for the delegate dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegateConfig {
    /// Log level configuration
    pub log_level: String,

    /// Policy applied when several delegates claim a URL
    pub selection: SelectionPolicy,

    /// Proxy URL every connection is routed through (`http://` or `socks5://`)
    pub proxy: Option<String>,

    /// Connect timeout of the TCP opener in seconds (0 or absent disables it)
    pub connect_timeout_secs: Option<u64>,

    /// Redirect rules, in selection order
    pub rules: Vec<RewriteRule>,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            selection: SelectionPolicy::FirstMatch,
            proxy: None,
            connect_timeout_secs: Some(10),
            rules: Vec::new(),
        }
    }
}

impl DelegateConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: DelegateConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` (or `config.yml`) when present, else defaults, then apply
    /// environment overrides
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            debug!("Loading configuration from {}", path.display());
            Self::from_yaml_file(path)?
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override settings from `DELEGATE_*` environment variables and `RUST_LOG`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override settings from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(proxy) = lookup("DELEGATE_PROXY") {
            let proxy = proxy.trim();
            self.proxy = if proxy.is_empty() { None } else { Some(proxy.to_string()) };
        }

        if let Some(selection) = lookup("DELEGATE_SELECTION") {
            match selection.trim().to_lowercase().as_str() {
                "first_match" => self.selection = SelectionPolicy::FirstMatch,
                "exclusive" => self.selection = SelectionPolicy::Exclusive,
                other => warn!("Ignoring unknown DELEGATE_SELECTION '{}'", other),
            }
        }

        if let Some(timeout) = lookup("DELEGATE_CONNECT_TIMEOUT_SECS") {
            match timeout.trim().parse::<u64>() {
                Ok(secs) => self.connect_timeout_secs = Some(secs),
                Err(_) => warn!("Ignoring invalid DELEGATE_CONNECT_TIMEOUT_SECS '{}'", timeout),
            }
        }

        if let Some(log_level) = lookup("RUST_LOG") {
            self.log_level = log_level;
        }
    }

    /// Check proxy and rule targets parse, and rule names are unique
    pub fn validate(&self) -> Result<()> {
        self.proxy()?;

        for (i, rule) in self.rules.iter().enumerate() {
            if rule.host.trim().is_empty() {
                return Err(Error::Config(format!("rule '{}' has an empty host", rule.name)));
            }
            RewriteDelegate::from_rule(rule).map_err(|e| {
                Error::Config(format!(
                    "rule '{}' has invalid target '{}': {}",
                    rule.name, rule.target, e
                ))
            })?;
            if self.rules[..i].iter().any(|r| r.name == rule.name) {
                return Err(Error::Config(format!("duplicate rule name '{}'", rule.name)));
            }
        }

        Ok(())
    }

    /// Configured proxy, if any
    pub fn proxy(&self) -> Result<Option<Proxy>> {
        match &self.proxy {
            Some(proxy) => Ok(Some(Proxy::parse(proxy)?)),
            None => Ok(None),
        }
    }

    /// TCP opener with the configured connect timeout
    pub fn opener(&self) -> TcpOpener {
        match self.connect_timeout_secs {
            Some(secs) if secs > 0 => {
                TcpOpener::new().with_connect_timeout(Duration::from_secs(secs))
            }
            _ => TcpOpener::new(),
        }
    }

    /// Dispatcher with one [`RewriteDelegate`] per rule, in file order
    pub fn build_dispatcher(&self) -> Result<Dispatcher> {
        let mut dispatcher = Dispatcher::new(self.selection).with_opener(Arc::new(self.opener()));
        for rule in &self.rules {
            let delegate = RewriteDelegate::from_rule(rule)?;
            debug!("Registered delegate '{}' for host {}", rule.name, rule.host);
            dispatcher.add_delegate(Arc::new(delegate));
        }
        Ok(dispatcher)
    }
}
