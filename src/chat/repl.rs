//! The interactive read-eval-print loop.

use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};

use crate::chat::command::{Command, CommandError};
use crate::chat::report;
use crate::llm::Orchestrator;
use crate::mcp::capability::{Invocation, InvocationResult};
use crate::normalized::NormalizedEvent;
use crate::session::Session;

/// Whether the loop should keep reading after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Line-oriented chat loop over any async reader and writer.
pub struct Repl<R, W> {
    lines: Lines<R>,
    output: W,
    orchestrator: Orchestrator,
    session: Session,
}

impl<R, W> std::fmt::Debug for Repl<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repl")
            .field("session", &self.session.id())
            .finish_non_exhaustive()
    }
}

impl<R, W> Repl<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(orchestrator: Orchestrator, session: Session, input: R, output: W) -> Self {
        Self {
            lines: input.lines(),
            output,
            orchestrator,
            session,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Give back the writer, e.g. to inspect a captured transcript.
    pub fn into_output(self) -> W {
        self.output
    }

    /// Read and handle lines until `exit` or end of input.
    ///
    /// # Errors
    ///
    /// Returns an error only when reading input or writing output fails.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.say(&format!("\nWelcome to the MCP Chatbot!\n{}", report::HELP))
            .await?;

        loop {
            self.output.write_all("\n🧑 You: ".as_bytes()).await?;
            self.output.flush().await?;

            let Some(line) = self.lines.next_line().await? else {
                break;
            };
            if self.handle_line(&line).await? == Flow::Exit {
                break;
            }
        }

        tracing::info!(
            session_id = %self.session.id(),
            started_at = %self.session.started_at().to_rfc3339(),
            turn_count = self.session.turn_count(),
            "Chat loop finished"
        );
        Ok(())
    }

    /// Handle one line of input.
    ///
    /// # Errors
    ///
    /// Returns an error only when writing output fails.
    pub async fn handle_line(&mut self, line: &str) -> anyhow::Result<Flow> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                self.report_syntax_error(&e).await?;
                return Ok(Flow::Continue);
            }
        };

        match command {
            Command::Exit => return Ok(Flow::Exit),
            Command::Empty => self.say("❌ Please enter a valid query.").await?,
            Command::Help => self.say(report::HELP).await?,
            Command::ListPrompts => {
                let text = report::prompt_listing(self.orchestrator.router().registry());
                self.say(&text).await?;
            }
            Command::ListTools => {
                let text = report::tool_listing(self.orchestrator.router().registry());
                self.say(&text).await?;
            }
            Command::ListResources => {
                let text = report::resource_listing(self.orchestrator.router().registry());
                self.say(&text).await?;
            }
            Command::Unknown(name) => self.say(&format!("❌ Unknown command: {name}")).await?,
            Command::ReadResource { uri } => self.read_resource(uri).await?,
            Command::RunPrompt { name, arguments } => self.run_prompt(name, arguments).await?,
            Command::Query(text) => self.query(&text).await?,
        }
        Ok(Flow::Continue)
    }

    async fn report_syntax_error(&mut self, error: &CommandError) -> anyhow::Result<()> {
        tracing::debug!(error = %error, "Rejected command");
        self.say(&format!("❌ {error}")).await
    }

    async fn read_resource(&mut self, uri: String) -> anyhow::Result<()> {
        let router = self.orchestrator.router();
        let text = match router.dispatch(Invocation::Resource { uri: uri.clone() }).await {
            Ok(InvocationResult::Resource(contents)) => report::render_resource(&uri, &contents),
            Ok(other) => format!("❌ Unexpected {} result for {uri}", other.kind()),
            Err(e) => format!("❌ {e}"),
        };
        self.say(&text).await
    }

    async fn run_prompt(
        &mut self,
        name: String,
        arguments: std::collections::BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        let router = self.orchestrator.router();
        let invocation = Invocation::Prompt {
            name: name.clone(),
            arguments: arguments.clone(),
        };
        let text = match router.dispatch(invocation).await {
            Ok(InvocationResult::Prompt(prompt)) => report::render_prompt(&name, &arguments, &prompt),
            Ok(other) => format!("❌ Unexpected {} result for prompt '{name}'", other.kind()),
            Err(e) => format!("❌ {e}"),
        };
        self.say(&text).await
    }

    async fn query(&mut self, text: &str) -> anyhow::Result<()> {
        let stream = self.orchestrator.run(&self.session, text);
        futures::pin_mut!(stream);

        // Whether a "Bot:" line is open and needs a newline before other output.
        let mut in_text = false;
        while let Some(event) = stream.next().await {
            match event {
                NormalizedEvent::MessageDelta { text } => {
                    if !in_text {
                        self.output.write_all("🤖 Bot: ".as_bytes()).await?;
                        in_text = true;
                    }
                    self.output.write_all(text.as_bytes()).await?;
                    self.output.flush().await?;
                }
                NormalizedEvent::ToolCallComplete {
                    name,
                    arguments_json,
                    ..
                } => {
                    self.end_text(&mut in_text).await?;
                    let args = if arguments_json.trim().is_empty() {
                        "{}"
                    } else {
                        arguments_json.as_str()
                    };
                    self.say(&format!("Calling tool {name} with args {args}"))
                        .await?;
                }
                NormalizedEvent::ToolResult {
                    name,
                    content,
                    success: false,
                    ..
                } => {
                    self.end_text(&mut in_text).await?;
                    self.say(&format!("❌ Tool '{name}' failed: {content}")).await?;
                }
                NormalizedEvent::Error { message, .. } => {
                    self.end_text(&mut in_text).await?;
                    self.say(&format!("❌ Error processing query: {message}"))
                        .await?;
                }
                NormalizedEvent::Done => self.end_text(&mut in_text).await?,
                NormalizedEvent::StreamStart { .. }
                | NormalizedEvent::ToolCallDelta { .. }
                | NormalizedEvent::ToolResult { .. } => {}
            }
        }
        self.end_text(&mut in_text).await
    }

    async fn end_text(&mut self, in_text: &mut bool) -> anyhow::Result<()> {
        if std::mem::take(in_text) {
            self.output.write_all(b"\n").await?;
            self.output.flush().await?;
        }
        Ok(())
    }

    async fn say(&mut self, text: &str) -> anyhow::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            self.output.write_all(b"\n").await?;
        }
        self.output.flush().await?;
        Ok(())
    }
}
