//! Provider-specific configuration and detection.
//!
//! This module handles differences between LLM API providers: which wire
//! protocol they speak by default and how requests are authenticated.

use super::LlmProtocol;

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Anthropic (api.anthropic.com)
    Anthropic,
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// `OpenRouter` (openrouter.ai)
    OpenRouter,
    /// Groq (groq.com)
    Groq,
    /// Generic OpenAI-compatible provider
    Generic,
}

impl Provider {
    /// Detect provider from base URL.
    ///
    /// # Example
    ///
    /// ```rust
    /// use paper_relay::llm::Provider;
    ///
    /// let provider = Provider::detect_from_url("https://api.anthropic.com");
    /// assert_eq!(provider, Provider::Anthropic);
    /// ```
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("anthropic.com") {
            Self::Anthropic
        } else if lower.contains("openrouter.ai") {
            Self::OpenRouter
        } else if lower.contains("groq.com") {
            Self::Groq
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Protocol used when the configuration says `auto`.
    #[must_use]
    pub fn default_protocol(self) -> LlmProtocol {
        match self {
            Self::Anthropic => LlmProtocol::Messages,
            Self::OpenAI | Self::OpenRouter | Self::Groq | Self::Generic => LlmProtocol::Chat,
        }
    }

    /// Provider-specific environment variable holding the API key.
    #[must_use]
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Generic => None,
        }
    }
}
