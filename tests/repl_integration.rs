mod common;

use std::sync::Arc;

use paper_relay::chat::{Flow, Repl};
use paper_relay::llm::{LlmDriver, Orchestrator};
use paper_relay::mcp::Router;
use paper_relay::session::Session;

use common::{CallLog, MockConnection, ScriptedDriver, connection_set, settings, text_reply, tool_reply};

async fn repl_with(
    log: &CallLog,
    driver: Arc<ScriptedDriver>,
    input: &'static [u8],
) -> Repl<&'static [u8], Vec<u8>> {
    let router = Router::from_connections(connection_set(vec![
        MockConnection::new("research", log)
            .with_tool("search_papers", "2401.00001v1")
            .with_resource("papers://folders", "- llm\n- physics")
            .with_template("papers://{topic}")
            .with_prompt("generate_search_prompt", "Search for papers about")
            .into_arc(),
    ]))
    .await;
    let orchestrator = Orchestrator::with_driver(
        settings(),
        Arc::new(router),
        driver as Arc<dyn LlmDriver>,
        10,
    );
    Repl::new(orchestrator, Session::new(), input, Vec::new())
}

fn transcript(repl: Repl<&'static [u8], Vec<u8>>) -> String {
    String::from_utf8(repl.into_output()).unwrap()
}

#[tokio::test]
async fn test_prompt_command_shows_text_without_model() {
    let log = CallLog::default();
    let driver = Arc::new(ScriptedDriver::default());
    let mut repl = repl_with(&log, driver.clone(), b"").await;

    let flow = repl
        .handle_line("/prompt generate_search_prompt topic=llm")
        .await
        .unwrap();
    assert_eq!(flow, Flow::Continue);

    let calls = log.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "generate_search_prompt");
    assert_eq!(calls[0].2, serde_json::json!({"topic": "llm"}));
    assert_eq!(driver.call_count(), 0);
    assert_eq!(repl.session().turn_count(), 0);

    let out = transcript(repl);
    assert!(out.contains("Search for papers about topic=llm"), "{out}");
}

#[tokio::test]
async fn test_unknown_prompt_reports_not_found() {
    let log = CallLog::default();
    let mut repl = repl_with(&log, Arc::new(ScriptedDriver::default()), b"").await;

    repl.handle_line("/prompt unknown_name x=1").await.unwrap();

    assert!(log.events().is_empty());
    let out = transcript(repl);
    assert!(out.contains("prompt 'unknown_name' not found"), "{out}");
}

#[tokio::test]
async fn test_malformed_prompt_touches_nothing() {
    let log = CallLog::default();
    let driver = Arc::new(ScriptedDriver::default());
    let mut repl = repl_with(&log, driver.clone(), b"").await;

    repl.handle_line("/prompt").await.unwrap();
    repl.handle_line("/prompt generate_search_prompt topic").await.unwrap();
    repl.handle_line("/prompt generate_search_prompt =llm").await.unwrap();

    assert!(log.events().is_empty());
    assert_eq!(driver.call_count(), 0);
    let out = transcript(repl);
    assert!(out.contains("usage: /prompt"));
    assert!(out.contains("argument 'topic' is not of the form key=value"));
    assert!(out.contains("argument '=llm' has an empty key"));
}

#[tokio::test]
async fn test_resource_shortcuts() {
    let log = CallLog::default();
    let mut repl = repl_with(&log, Arc::new(ScriptedDriver::default()), b"").await;

    repl.handle_line("@folders").await.unwrap();
    repl.handle_line("@llm").await.unwrap();

    let uris: Vec<String> = log.calls().into_iter().map(|(_, name, _)| name).collect();
    assert_eq!(uris, vec!["papers://folders", "papers://llm"]);
    assert_eq!(repl.session().turn_count(), 0);

    let out = transcript(repl);
    assert!(out.contains("- llm\n- physics"));
    assert!(out.contains("Retrieved resource: papers://llm"));
}

#[tokio::test]
async fn test_listing_and_misc_commands() {
    let log = CallLog::default();
    let mut repl = repl_with(&log, Arc::new(ScriptedDriver::default()), b"").await;

    repl.handle_line("/prompts").await.unwrap();
    repl.handle_line("/tools").await.unwrap();
    repl.handle_line("/resources").await.unwrap();
    repl.handle_line("").await.unwrap();
    repl.handle_line("/bogus").await.unwrap();
    assert_eq!(repl.handle_line("Exit").await.unwrap(), Flow::Exit);

    assert!(log.events().is_empty());
    let out = transcript(repl);
    assert!(out.contains("- generate_search_prompt: generate_search_prompt prompt"));
    assert!(out.contains("- search_papers [research]"));
    assert!(out.contains("- papers://{topic} (template) [research]"));
    assert!(out.contains("Please enter a valid query."));
    assert!(out.contains("Unknown command: /bogus"));
}

#[tokio::test]
async fn test_full_session_over_reader() {
    let log = CallLog::default();
    let driver = Arc::new(ScriptedDriver::new(vec![
        tool_reply(&[("call_1", "search_papers", r#"{"topic":"llm"}"#)]),
        text_reply("I found 2401.00001v1."),
    ]));
    let mut repl = repl_with(
        &log,
        driver.clone(),
        b"find llm papers\n@folders\nexit\nnever read\n",
    )
    .await;

    repl.run().await.unwrap();

    assert_eq!(driver.call_count(), 2);
    assert_eq!(log.calls().len(), 2);
    // user, assistant(call), tool result, assistant
    assert_eq!(repl.session().turn_count(), 4);

    let out = transcript(repl);
    assert!(out.contains("Welcome to the MCP Chatbot!"));
    assert!(out.contains(r#"Calling tool search_papers with args {"topic":"llm"}"#));
    assert!(out.contains("🤖 Bot: I found 2401.00001v1.\n"));
    assert!(out.contains("Retrieved resource: papers://folders"));
}

#[tokio::test]
async fn test_model_error_is_reported_and_loop_continues() {
    let log = CallLog::default();
    // No scripts: every model call fails.
    let driver = Arc::new(ScriptedDriver::default());
    let mut repl = repl_with(&log, driver.clone(), b"hello\n/tools\n").await;

    repl.run().await.unwrap();

    assert_eq!(driver.call_count(), 1);
    let out = transcript(repl);
    assert!(out.contains("Error processing query: no more scripted responses"));
    assert!(out.contains("- search_papers [research]"));
}
