//! Application configuration.
//!
//! Precedence, lowest to highest: built-in defaults, the config file
//! (`--config` or `./paper-relay.{yaml,toml,json}` if present),
//! `PAPER_RELAY_` environment variables (`__` between section and key, e.g.
//! `PAPER_RELAY_LLM__MODEL`), then command-line flags and their env aliases.

use std::env;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::llm::orchestrator::DEFAULT_MAX_TOOL_ROUNDS;
use crate::llm::{LlmProtocol, LlmSettings, Provider};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "PAPER_RELAY_CONFIG")]
    pub config: Option<String>,

    /// MCP server list (JSON)
    #[arg(short, long, env = "MCP_SERVERS_FILE")]
    pub servers: Option<String>,

    /// Model identifier
    #[arg(long, env = "LLM_MODEL")]
    pub model: Option<String>,

    /// Base URL of the model API
    #[arg(long, env = "LLM_BASE_URL")]
    pub base_url: Option<String>,

    /// Wire protocol: auto, chat or messages
    #[arg(long, env = "LLM_PROTOCOL")]
    pub protocol: Option<String>,

    /// Model round trips allowed per input
    #[arg(long, env = "MAX_TOOL_ROUNDS")]
    pub max_tool_rounds: Option<u32>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub chat: ChatConfig,
    pub mcp: McpSection,
    pub log: LogConfig,
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub protocol: String,
    pub max_tokens: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("protocol", &self.protocol)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub max_tool_rounds: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct McpSection {
    pub servers_file: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        // 1. Defaults
        let mut builder = Config::builder()
            .set_default("llm.base_url", "https://api.anthropic.com")?
            .set_default("llm.model", "claude-3-7-sonnet-20250219")?
            .set_default("llm.protocol", "auto")?
            .set_default("llm.max_tokens", 2024)?
            .set_default("chat.max_tool_rounds", DEFAULT_MAX_TOOL_ROUNDS as u64)?
            .set_default("mcp.servers_file", "server_config.json")?
            .set_default("log.json", false)?;

        // 2. Config file
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("paper-relay").required(false)),
        };

        // 3. PAPER_RELAY_SECTION__KEY
        builder = builder.add_source(
            Environment::with_prefix("PAPER_RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their env aliases)
        if let Some(servers) = cli.servers {
            builder = builder.set_override("mcp.servers_file", servers)?;
        }
        if let Some(model) = cli.model {
            builder = builder.set_override("llm.model", model)?;
        }
        if let Some(base_url) = cli.base_url {
            builder = builder.set_override("llm.base_url", base_url)?;
        }
        if let Some(protocol) = cli.protocol {
            builder = builder.set_override("llm.protocol", protocol)?;
        }
        if let Some(rounds) = cli.max_tool_rounds {
            builder = builder.set_override("chat.max_tool_rounds", u64::from(rounds))?;
        }
        if let Some(json) = cli.log_json {
            builder = builder.set_override("log.json", json)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Resolve model settings: protocol, provider and API key.
    ///
    /// The key comes from `llm.api_key`, then `LLM_API_KEY`, then the
    /// provider's own variable such as `ANTHROPIC_API_KEY`.
    ///
    /// # Errors
    ///
    /// Fails on an empty base URL or model, or an unknown protocol name.
    pub fn llm_settings(&self) -> anyhow::Result<LlmSettings> {
        let llm = &self.llm;
        if llm.base_url.trim().is_empty() {
            anyhow::bail!("llm.base_url cannot be empty");
        }
        if llm.model.trim().is_empty() {
            anyhow::bail!("llm.model cannot be empty");
        }

        let protocol: LlmProtocol = llm.protocol.parse().map_err(anyhow::Error::msg)?;
        let provider = Provider::detect_from_url(&llm.base_url);

        let api_key = llm
            .api_key
            .clone()
            .or_else(|| env::var("LLM_API_KEY").ok())
            .or_else(|| provider.api_key_env().and_then(|name| env::var(name).ok()))
            .filter(|k| !k.trim().is_empty());

        Ok(LlmSettings {
            base_url: llm.base_url.clone(),
            api_key,
            model: llm.model.clone(),
            protocol,
            provider,
            max_tokens: llm.max_tokens,
            system_prompt: llm.system_prompt.clone().filter(|s| !s.trim().is_empty()),
        })
    }
}
