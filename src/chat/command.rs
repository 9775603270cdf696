//! Parsing of one line of user input.

use std::collections::BTreeMap;

/// Scheme used for `@` resource shortcuts.
pub const RESOURCE_SCHEME: &str = "papers://";

/// What a line of input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line.
    Empty,
    /// `exit`, any case.
    Exit,
    /// `@folders` or `@<topic>`.
    ReadResource { uri: String },
    /// `/prompts`
    ListPrompts,
    /// `/prompt <name> <k=v>...`
    RunPrompt {
        name: String,
        arguments: BTreeMap<String, String>,
    },
    /// `/tools`
    ListTools,
    /// `/resources`
    ListResources,
    /// `/help`
    Help,
    /// Any other `/word`.
    Unknown(String),
    /// Free text for the model.
    Query(String),
}

/// Malformed command syntax. Nothing is contacted when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("usage: /prompt <name> <arg1=value1> <arg2=value2> ...")]
    MissingPromptName,

    #[error("argument '{0}' is not of the form key=value")]
    MalformedArgument(String),

    #[error("argument '{0}' has an empty key")]
    EmptyKey(String),

    #[error("usage: @folders or @<topic>")]
    MissingTopic,
}

impl Command {
    /// Parse a raw input line. Leading and trailing whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when a `/prompt` or `@` command is malformed.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Empty);
        }
        if line.eq_ignore_ascii_case("exit") {
            return Ok(Self::Exit);
        }

        if let Some(topic) = line.strip_prefix('@') {
            let topic = topic.trim();
            if topic.is_empty() {
                return Err(CommandError::MissingTopic);
            }
            let uri = if topic == "folders" {
                format!("{RESOURCE_SCHEME}folders")
            } else {
                format!("{RESOURCE_SCHEME}{topic}")
            };
            return Ok(Self::ReadResource { uri });
        }

        if line.starts_with('/') {
            let mut parts = line.split_whitespace();
            let command = parts.next().unwrap_or_default().to_lowercase();
            return match command.as_str() {
                "/prompts" => Ok(Self::ListPrompts),
                "/prompt" => {
                    let name = parts.next().ok_or(CommandError::MissingPromptName)?;
                    let arguments = parse_arguments(parts)?;
                    Ok(Self::RunPrompt {
                        name: name.to_string(),
                        arguments,
                    })
                }
                "/tools" => Ok(Self::ListTools),
                "/resources" => Ok(Self::ListResources),
                "/help" => Ok(Self::Help),
                _ => Ok(Self::Unknown(command)),
            };
        }

        Ok(Self::Query(line.to_string()))
    }
}

fn parse_arguments<'a>(
    tokens: impl Iterator<Item = &'a str>,
) -> Result<BTreeMap<String, String>, CommandError> {
    let mut arguments = BTreeMap::new();
    for token in tokens {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| CommandError::MalformedArgument(token.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CommandError::EmptyKey(token.to_string()));
        }
        arguments.insert(key.to_string(), value.trim().to_string());
    }
    Ok(arguments)
}
