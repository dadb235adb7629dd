//! Configuration Manager

use super::Config;
use crate::crypto::Method;
use crate::Result;
use anyhow::{bail, Context};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Upper bound for the configured timeout
const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file. `.json` files are parsed as JSON, anything
    /// else as TOML. The result is not validated; callers validate once every
    /// override has been applied.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config: Config = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        };

        Ok(config)
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(server) = std::env::var("SSRELAY_SERVER") {
            config.server = server;
        }

        if let Ok(port) = std::env::var("SSRELAY_SERVER_PORT") {
            config.server_port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid SSRELAY_SERVER_PORT: {}", port))?;
        }

        if let Ok(password) = std::env::var("SSRELAY_PASSWORD") {
            config.password = password;
        }

        if let Ok(method) = std::env::var("SSRELAY_METHOD") {
            config.method = method;
        }

        if let Ok(timeout) = std::env::var("SSRELAY_TIMEOUT") {
            config.timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid SSRELAY_TIMEOUT: {}", timeout))?;
        }

        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            bail!("server address must not be empty");
        }

        Method::from_name(&self.method)
            .with_context(|| format!("Invalid method: {}", self.method))?;

        if self.timeout.is_zero() {
            bail!("timeout must be greater than 0");
        }

        if self.timeout > MAX_TIMEOUT {
            bail!("timeout cannot exceed 1 hour");
        }

        self.port_passwords()
            .with_context(|| "Port configuration validation failed")?;

        Ok(())
    }

    /// The effective port to password map.
    ///
    /// `port_password` wins when present; otherwise `server_port` and
    /// `password` form a single entry.
    pub fn port_passwords(&self) -> Result<BTreeMap<u16, String>> {
        let mut ports = BTreeMap::new();

        if self.port_password.is_empty() {
            if self.server_port == 0 || self.password.is_empty() {
                bail!("must specify both port and password");
            }
            ports.insert(self.server_port, self.password.clone());
            return Ok(ports);
        }

        for (port, password) in &self.port_password {
            let parsed = port
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid port in port_password: {}", port))?;
            if parsed == 0 {
                bail!("port_password contains invalid port 0");
            }
            if password.is_empty() {
                bail!("Port {} has empty password", parsed);
            }
            ports.insert(parsed, password.clone());
        }

        Ok(ports)
    }

    /// Warn when `port_password` shadows the single-port settings
    pub fn warn_ignored_fields(&self) {
        if !self.port_password.is_empty() && (self.server_port != 0 || !self.password.is_empty())
        {
            tracing::warn!("given port_password, ignore server_port and password option");
        }
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        server: Option<&str>,
        port: Option<u16>,
        password: Option<&str>,
        method: Option<&str>,
        timeout: Option<u64>,
    ) {
        if let Some(server) = server {
            self.server = server.to_string();
            tracing::info!("CLI override: server address set to {}", server);
        }

        if let Some(port) = port {
            self.server_port = port;
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(password) = password {
            self.password = password.to_string();
            tracing::info!("CLI override: password set");
        }

        if let Some(method) = method {
            self.method = method.to_string();
            tracing::info!("CLI override: method set to {}", method);
        }

        if let Some(timeout_secs) = timeout {
            self.timeout = Duration::from_secs(timeout_secs);
            tracing::info!("CLI override: timeout set to {}s", timeout_secs);
        }
    }
}
