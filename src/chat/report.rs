//! Text rendering for the terminal: startup report, listings and
//! capability results.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::mcp::capability::{RenderedPrompt, ResourceContent};
use crate::mcp::registry::CapabilityRegistry;
use crate::mcp::session::ConnectError;

/// Command summary printed at startup and by `/help`.
pub const HELP: &str = "\
Type 'exit' to quit.
Use @folders to see available topics
Use @<topic> to search papers in that topic
Use /prompts to list available prompts
Use /prompt <name> <arg1=value1> to execute a prompt
Use /tools to list available tools
Use /resources to list available resources";

/// Per-server connection outcome and contributed capability names, in
/// configuration order for connected servers, failures last.
#[must_use]
pub fn startup_report(registry: &CapabilityRegistry, failures: &[ConnectError]) -> String {
    let mut out = String::new();
    for summary in registry.summaries() {
        let server = &summary.connection;
        writeln!(out, "Connected to server: {server}").ok();
        if !summary.tools.is_empty() {
            writeln!(out, "  Tools available on {server}: {}", summary.tools.join(", ")).ok();
        }
        if !summary.prompts.is_empty() {
            writeln!(out, "  Prompts available on {server}: {}", summary.prompts.join(", ")).ok();
        }
        if !summary.resources.is_empty() {
            writeln!(
                out,
                "  Resources available on {server}: {}",
                summary.resources.join(", ")
            )
            .ok();
        }
        for error in &summary.errors {
            writeln!(out, "  ❌ Error listing capabilities on {server}: {error}").ok();
        }
    }
    for failure in failures {
        writeln!(out, "❌ Failed to connect to server {}: {failure}", failure.server()).ok();
    }
    if registry.summaries().is_empty() && failures.is_empty() {
        writeln!(out, "No MCP servers configured.").ok();
    }
    out
}

#[must_use]
pub fn prompt_listing(registry: &CapabilityRegistry) -> String {
    let mut prompts = registry.prompts().peekable();
    if prompts.peek().is_none() {
        return "No prompts available.".to_string();
    }

    let mut out = String::from("Available Prompts:\n");
    for (prompt, _) in prompts {
        writeln!(
            out,
            "- {}: {}",
            prompt.name,
            prompt.description.as_deref().unwrap_or("")
        )
        .ok();
        if !prompt.arguments.is_empty() {
            out.push_str("  Arguments:\n");
            for arg in &prompt.arguments {
                let marker = if arg.required { " (required)" } else { "" };
                writeln!(out, "    - {}{marker}", arg.name).ok();
            }
        }
    }
    out
}

#[must_use]
pub fn tool_listing(registry: &CapabilityRegistry) -> String {
    let mut tools = registry.tools().peekable();
    if tools.peek().is_none() {
        return "No tools available.".to_string();
    }

    let mut out = String::from("Available Tools:\n");
    for (tool, owner) in tools {
        writeln!(out, "- {} [{owner}]", tool.name).ok();
    }
    out
}

#[must_use]
pub fn resource_listing(registry: &CapabilityRegistry) -> String {
    let mut out = String::new();
    for (resource, owner) in registry.resources() {
        writeln!(out, "- {} [{owner}]", resource.uri).ok();
    }
    for (template, owner) in registry.resource_templates() {
        writeln!(out, "- {} (template) [{owner}]", template.uri_template).ok();
    }
    if out.is_empty() {
        "No resources available.".to_string()
    } else {
        format!("Available Resources:\n{out}")
    }
}

/// Contents of a `resources/read` result.
#[must_use]
pub fn render_resource(uri: &str, contents: &[ResourceContent]) -> String {
    if contents.is_empty() {
        return format!("Resource {uri} is empty, no content available.");
    }

    let mut out = format!("Retrieved resource: {uri}\n");
    for content in contents {
        match content {
            ResourceContent::Text { text, .. } => {
                out.push_str(text);
                out.push('\n');
            }
            ResourceContent::Blob {
                uri,
                mime_type,
                blob,
            } => {
                writeln!(
                    out,
                    "[binary content at {uri}, {}, {} base64 chars]",
                    mime_type.as_deref().unwrap_or("unknown type"),
                    blob.len()
                )
                .ok();
            }
        }
    }
    out
}

/// A rendered prompt as shown to the user.
#[must_use]
pub fn render_prompt(
    name: &str,
    arguments: &BTreeMap<String, String>,
    prompt: &RenderedPrompt,
) -> String {
    let args = arguments
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("Prompt '{name}' ({args}):\n{}", prompt.text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::capability::{ConnectionId, PromptDescriptor, ToolDescriptor};
    use crate::mcp::registry::{Advertised, RegistryBuilder};

    fn registry() -> CapabilityRegistry {
        let mut builder = RegistryBuilder::new();
        builder.register(
            &ConnectionId::new("research"),
            Advertised {
                tools: vec![ToolDescriptor {
                    name: "search_papers".into(),
                    description: None,
                    input_schema: serde_json::json!({"type": "object"}),
                }],
                prompts: vec![PromptDescriptor {
                    name: "generate_search_prompt".into(),
                    description: Some("Search prompt".into()),
                    arguments: vec![],
                }],
                ..Advertised::default()
            },
        );
        builder.build()
    }

    #[test]
    fn test_startup_report_lists_servers_and_failures() {
        let failures = vec![ConnectError::Spawn {
            server: "fetch".into(),
            command: "uvx mcp-server-fetch".into(),
            message: "not found".into(),
        }];
        let report = startup_report(&registry(), &failures);
        assert!(report.contains("Connected to server: research"));
        assert!(report.contains("search_papers"));
        assert!(report.contains("Failed to connect to server fetch"));
    }

    #[test]
    fn test_listings() {
        let registry = registry();
        assert!(prompt_listing(&registry).contains("- generate_search_prompt: Search prompt"));
        assert!(tool_listing(&registry).contains("- search_papers [research]"));
        assert_eq!(resource_listing(&registry), "No resources available.");
        assert_eq!(
            prompt_listing(&CapabilityRegistry::new_empty()),
            "No prompts available."
        );
    }

    #[test]
    fn test_render_resource() {
        let out = render_resource(
            "papers://folders",
            &[ResourceContent::Text {
                uri: "papers://folders".into(),
                mime_type: Some("text/markdown".into()),
                text: "- llm".into(),
            }],
        );
        assert!(out.starts_with("Retrieved resource: papers://folders"));
        assert!(out.contains("- llm"));
        assert!(render_resource("papers://x", &[]).contains("is empty"));
    }
}
