use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::HashMap, fmt, fs, path::Path};

/// Parsed `server_config.json`.
///
/// Servers keep their declaration order: it is the registration order the
/// capability registry uses to settle name collisions.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", deserialize_with = "ordered_servers", default)]
    pub mcp_servers: Vec<NamedServer>,
}

#[derive(Debug, Clone)]
pub struct NamedServer {
    pub name: String,
    pub entry: McpServerEntry,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum McpServerEntry {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    RemoteHttp {
        url: String,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

impl McpServerEntry {
    /// Short human-readable description of how the server is reached.
    pub fn describe(&self) -> String {
        match self {
            Self::Stdio { command, args, .. } if args.is_empty() => command.clone(),
            Self::Stdio { command, args, .. } => format!("{command} {}", args.join(" ")),
            Self::RemoteHttp { url, .. } => url.clone(),
        }
    }
}

pub fn load_mcp_config(path: impl AsRef<Path>) -> anyhow::Result<McpConfig> {
    let txt = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&txt)?)
}

fn ordered_servers<'de, D>(deserializer: D) -> Result<Vec<NamedServer>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ServersVisitor;

    impl<'de> Visitor<'de> for ServersVisitor {
        type Value = Vec<NamedServer>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of server name to server entry")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut out: Vec<NamedServer> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, entry)) = map.next_entry::<String, McpServerEntry>()? {
                // A repeated key keeps its first position but takes the later entry.
                if let Some(existing) = out.iter_mut().find(|s| s.name == name) {
                    existing.entry = entry;
                } else {
                    out.push(NamedServer { name, entry });
                }
            }
            Ok(out)
        }
    }

    deserializer.deserialize_map(ServersVisitor)
}

/// Expand "${VAR}" placeholders from the process environment.
/// Missing variables leave the placeholder unchanged.
pub fn expand_env_placeholders(input: &str) -> String {
    expand_placeholders(input, |name| std::env::var(name).ok())
}

/// Like [`expand_env_placeholders`], but `overrides` is consulted before the
/// process environment.
pub fn expand_env_placeholders_with(input: &str, overrides: &HashMap<String, String>) -> String {
    expand_placeholders(input, |name| {
        overrides
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    })
}

fn expand_placeholders(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) if !name.is_empty() => out.push_str(&value),
                    _ => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn expand_env_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), expand_env_placeholders(v)))
        .collect()
}
