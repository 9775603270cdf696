mod common;

use paper_relay::mcp::capability::{
    CapabilityKind, ConnectionId, Invocation, InvocationResult, ResourceContent,
};
use paper_relay::mcp::{CapabilityRegistry, DispatchError, Router};

use common::{CallLog, MockConnection, connection_set};

fn args(pairs: &[(&str, &str)]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), serde_json::Value::String((*v).to_string())))
        .collect()
}

#[tokio::test]
async fn test_tool_dispatch_forwards_once_to_owner() {
    let log = CallLog::default();
    let router = Router::from_connections(connection_set(vec![
        MockConnection::new("filesystem", &log)
            .with_tool("read_file", "file body")
            .into_arc(),
        MockConnection::new("research", &log)
            .with_tool("search_papers", "2401.00001v1")
            .into_arc(),
    ]))
    .await;

    let result = router
        .dispatch(Invocation::Tool {
            name: "search_papers".into(),
            arguments: args(&[("topic", "llm")]),
        })
        .await
        .unwrap();

    let InvocationResult::Tool(output) = result else {
        panic!("expected tool result");
    };
    assert_eq!(output.text(), "2401.00001v1");
    assert_eq!(
        log.calls(),
        vec![(
            "research".to_string(),
            "search_papers".to_string(),
            serde_json::json!({"topic": "llm"})
        )]
    );
}

#[tokio::test]
async fn test_later_connection_wins_every_collision() {
    let log = CallLog::default();
    let router = Router::from_connections(connection_set(vec![
        MockConnection::new("a", &log)
            .with_tool("shared", "from a")
            .with_tool("only_a", "a")
            .with_prompt("summarize", "a says")
            .into_arc(),
        MockConnection::new("b", &log)
            .with_tool("shared", "from b")
            .into_arc(),
        MockConnection::new("c", &log)
            .with_prompt("summarize", "c says")
            .into_arc(),
    ]))
    .await;
    let registry = router.registry();

    assert_eq!(
        registry.resolve(CapabilityKind::Tool, "shared").unwrap(),
        &ConnectionId::new("b")
    );
    assert_eq!(
        registry.resolve(CapabilityKind::Tool, "only_a").unwrap(),
        &ConnectionId::new("a")
    );
    assert_eq!(
        registry.resolve(CapabilityKind::Prompt, "summarize").unwrap(),
        &ConnectionId::new("c")
    );
    // One schema per distinct name
    assert_eq!(registry.tool_count(), 2);
}

#[tokio::test]
async fn test_resolution_is_stable() {
    let log = CallLog::default();
    let router = Router::from_connections(connection_set(vec![
        MockConnection::new("a", &log).with_tool("t", "a").into_arc(),
        MockConnection::new("b", &log).with_tool("t", "b").into_arc(),
    ]))
    .await;

    let first = router.registry().resolve(CapabilityKind::Tool, "t").unwrap().clone();
    let second = router.registry().resolve(CapabilityKind::Tool, "t").unwrap().clone();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_duplicate_resource_uri_reads_from_later_connection() {
    let log = CallLog::default();
    let router = Router::from_connections(connection_set(vec![
        MockConnection::new("first", &log)
            .with_resource("papers://folders", "- old_topic")
            .into_arc(),
        MockConnection::new("second", &log)
            .with_resource("papers://folders", "- llm\n- physics")
            .into_arc(),
    ]))
    .await;

    let result = router
        .dispatch(Invocation::Resource {
            uri: "papers://folders".into(),
        })
        .await
        .unwrap();

    let InvocationResult::Resource(contents) = result else {
        panic!("expected resource contents");
    };
    assert!(matches!(
        &contents[0],
        ResourceContent::Text { text, .. } if text == "- llm\n- physics"
    ));
    assert_eq!(log.calls()[0].0, "second");
}

#[tokio::test]
async fn test_templates_route_topics_and_exact_uris_win() {
    let log = CallLog::default();
    let router = Router::from_connections(connection_set(vec![
        MockConnection::new("catalog", &log)
            .with_resource("papers://folders", "- llm")
            .into_arc(),
        MockConnection::new("research", &log)
            .with_template("papers://{topic}")
            .into_arc(),
    ]))
    .await;

    router
        .dispatch(Invocation::Resource {
            uri: "papers://llm".into(),
        })
        .await
        .unwrap();
    router
        .dispatch(Invocation::Resource {
            uri: "papers://folders".into(),
        })
        .await
        .unwrap();

    let owners: Vec<String> = log.calls().into_iter().map(|(c, _, _)| c).collect();
    assert_eq!(owners, vec!["research", "catalog"]);
}

#[tokio::test]
async fn test_unknown_names_make_no_calls() {
    let log = CallLog::default();
    let router = Router::from_connections(connection_set(vec![
        MockConnection::new("research", &log)
            .with_tool("search_papers", "[]")
            .with_prompt("generate_search_prompt", "Search for")
            .into_arc(),
    ]))
    .await;

    let invocations = [
        Invocation::Tool {
            name: "delete_everything".into(),
            arguments: serde_json::Map::new(),
        },
        Invocation::Resource {
            uri: "papers://nowhere/deep".into(),
        },
        Invocation::Prompt {
            name: "unknown_name".into(),
            arguments: [("x".to_string(), "1".to_string())].into(),
        },
    ];
    for invocation in invocations {
        let err = router.dispatch(invocation).await.unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }
    assert!(log.events().is_empty());
}

#[tokio::test]
async fn test_invocation_failure_is_passed_through() {
    let log = CallLog::default();
    let router = Router::from_connections(connection_set(vec![
        MockConnection::new("flaky", &log)
            .with_failing_tool("fetch", "connection reset by peer")
            .into_arc(),
    ]))
    .await;

    let err = router
        .dispatch(Invocation::Tool {
            name: "fetch".into(),
            arguments: serde_json::Map::new(),
        })
        .await
        .unwrap_err();

    match &err {
        DispatchError::Invocation {
            connection, error, ..
        } => {
            assert_eq!(connection.as_str(), "flaky");
            assert_eq!(error.to_string(), "connection reset by peer");
        }
        other => panic!("unexpected error: {other}"),
    }
    // Exactly one attempt, no retry
    assert_eq!(log.calls().len(), 1);
}

#[tokio::test]
async fn test_listing_failure_leaves_other_connections_intact() {
    let log = CallLog::default();
    let registry = CapabilityRegistry::refresh(
        connection_set(vec![
            MockConnection::new("broken", &log)
                .with_tool("hidden", "x")
                .failing_listing()
                .into_arc(),
            MockConnection::new("research", &log)
                .with_tool("search_papers", "[]")
                .into_arc(),
        ])
        .as_slice(),
    )
    .await;

    assert!(registry.resolve(CapabilityKind::Tool, "hidden").is_err());
    assert!(registry.resolve(CapabilityKind::Tool, "search_papers").is_ok());

    let broken = &registry.summaries()[0];
    assert_eq!(broken.connection.as_str(), "broken");
    assert!(!broken.errors.is_empty());
}

#[tokio::test]
async fn test_empty_router_finds_nothing() {
    let router = Router::new_empty();
    let err = router
        .dispatch(Invocation::Prompt {
            name: "anything".into(),
            arguments: Default::default(),
        })
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "prompt 'anything' not found");
}

#[tokio::test]
async fn test_close_all_shuts_down_every_connection_in_order() {
    let log = CallLog::default();
    let router = Router::from_connections(connection_set(vec![
        MockConnection::new("filesystem", &log).into_arc(),
        MockConnection::new("research", &log).into_arc(),
        MockConnection::new("fetch", &log).into_arc(),
    ]))
    .await;

    assert!(log.closed().is_empty());
    router.close_all();

    assert_eq!(log.closed(), vec!["filesystem", "research", "fetch"]);
    assert!(log.events().is_empty());
}
