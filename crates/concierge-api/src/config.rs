//! Runtime options and the TOML config file.
//!
//! Precedence, highest first: command-line flags, then the config file,
//! then built-in defaults. A missing config file is not an error; every
//! field has a usable default. The provider API key never appears in the
//! file itself -- the file names an environment variable and the key is
//! read from there into a `SecretString`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;
use serde::Deserialize;

use concierge_agents::graphs::DEFAULT_MAX_STEPS;

/// Command-line options for the `concierge` binary.
#[derive(Debug, Parser)]
#[command(name = "concierge", version, about = "Concierge assistant server")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, env = "CONCIERGE_CONFIG", default_value = "concierge.toml")]
    pub config: PathBuf,

    /// Bind host, overriding the config file.
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port, overriding the config file.
    #[arg(long)]
    pub port: Option<u16>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Export spans through the OpenTelemetry stdout pipeline.
    #[arg(long)]
    pub otel: bool,
}

impl Cli {
    /// Default tracing directives for the chosen verbosity. `RUST_LOG`
    /// still wins when set.
    pub fn log_directives(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "info,concierge_core=debug,concierge_agents=debug,concierge_api=debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub polling: PollingSettings,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Any OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Attempts per decision call, transient failures only.
    pub max_attempts: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingSettings {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// The user whose mailbox the background schedule watches.
    pub user_id: String,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
            user_id: "default_user".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Step allowance for one interactive run.
    pub max_steps: u32,
    /// Step allowance for one polling tick; the pipeline is short, so a
    /// tick that needs more than this is looping.
    pub poll_max_steps: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            poll_max_steps: 10,
        }
    }
}

impl Config {
    /// Read the config file and fold in command-line overrides.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(raw) => toml::from_str(&raw)
                .with_context(|| format!("invalid config file {}", cli.config.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("cannot read config file {}", cli.config.display()));
            }
        };

        if let Some(host) = &cli.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        Ok(config)
    }

    /// Resolve the provider API key from the configured environment
    /// variable.
    pub fn api_key(&self) -> anyhow::Result<SecretString> {
        let raw = std::env::var(&self.provider.api_key_env).with_context(|| {
            format!(
                "environment variable {} is not set (expected the decision provider API key)",
                self.provider.api_key_env
            )
        })?;
        Ok(SecretString::from(raw))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
