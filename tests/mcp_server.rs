mod common;
use common::{dispatcher_with, MockTransport};

use ispw::mcp::catalog::catalog;
use ispw::mcp::server::McpServer;
use ispw::services::logger::Logger;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn server_with(transport: Arc<MockTransport>) -> McpServer {
    McpServer::new(Arc::new(dispatcher_with(transport)), Logger::new("test"))
}

async fn call(server: &McpServer, request: Value) -> Value {
    let response = server
        .handle_line(&request.to_string())
        .await
        .expect("response");
    serde_json::to_value(&response).expect("serialize")
}

#[tokio::test]
async fn tools_list_exposes_every_operation_with_annotations() {
    let server = server_with(MockTransport::json(200, json!({})));
    let response = call(&server, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;

    let tools = response["result"]["tools"].as_array().expect("tools");
    assert_eq!(tools.len(), catalog().len());
    let names: HashSet<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    for descriptor in catalog() {
        assert!(names.contains(descriptor.tool_name().as_str()));
    }
    for tool in tools {
        let annotations = &tool["annotations"];
        for key in ["readOnlyHint", "destructiveHint", "idempotentHint", "openWorldHint"] {
            assert!(annotations[key].is_boolean(), "{} {}", tool["name"], key);
        }
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
    let get = tools
        .iter()
        .find(|t| t["name"] == "ispw_get_assignment")
        .expect("get_assignment");
    assert_eq!(get["annotations"]["readOnlyHint"], true);
    assert_eq!(get["inputSchema"]["required"], json!(["assignment_id"]));
}

#[tokio::test]
async fn tools_call_returns_text_content_and_meta() {
    let server = server_with(MockTransport::json(
        200,
        json!({"releaseId": "R1", "status": "Open"}),
    ));
    let response = call(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "ispw_get_release", "arguments": {"release_id": "R1"}}
        }),
    )
    .await;

    let result = &response["result"];
    assert_eq!(result["content"][0]["type"], "text");
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .starts_with("## Release: R1"));
    assert!(result.get("structuredContent").is_none());
    assert_eq!(result["_meta"]["operation"], "get_release");
    assert_eq!(result["_meta"]["read_only"], true);
    assert_eq!(result["_meta"]["status"], 200);
}

#[tokio::test]
async fn structured_calls_include_structured_content() {
    let server = server_with(MockTransport::json(200, json!({"setId": "S1", "ownerId": "jdoe"})));
    let response = call(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "tools/call",
            "params": {"name": "get_set", "arguments": {"set_id": "S1", "response_format": "json"}}
        }),
    )
    .await;

    let result = &response["result"];
    assert_eq!(result["structuredContent"], json!({"set_id": "S1", "owner_id": "jdoe"}));
    assert_eq!(result["_meta"]["mode"], "structured");
}

#[tokio::test]
async fn tool_errors_use_category_specific_codes() {
    let server = server_with(MockTransport::json(404, json!({})));

    let invalid = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
               "params": {"name": "ispw_get_assignment", "arguments": {}}}),
    )
    .await;
    assert_eq!(invalid["error"]["code"], -32602);
    assert!(invalid["error"]["message"]
        .as_str()
        .unwrap_or_default()
        .contains("category: input_invalid"));

    let missing = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
               "params": {"name": "ispw_get_assignment", "arguments": {"assignment_id": "PLAY000001"}}}),
    )
    .await;
    assert_eq!(missing["error"]["code"], -32603);
    let message = missing["error"]["message"].as_str().unwrap_or_default();
    assert!(message.contains("code: NOT_FOUND"));
    assert!(message.contains("PLAY000001"));
}

#[tokio::test]
async fn unexpected_status_body_and_error_details_reach_the_caller() {
    let server = server_with(MockTransport::json(
        418,
        json!({"detail": "I am a teapot TEAPOT-7"}),
    ));
    let response = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call",
               "params": {"name": "ispw_list_sets", "arguments": {}}}),
    )
    .await;

    let error = &response["error"];
    assert_eq!(error["code"], -32603);
    assert!(error["message"]
        .as_str()
        .unwrap_or_default()
        .contains("TEAPOT-7"));
    assert_eq!(error["data"]["category"], "unknown_failure");
    assert_eq!(error["data"]["status"], 418);
    assert!(error["data"]["details"]["body"]
        .as_str()
        .unwrap_or_default()
        .contains("TEAPOT-7"));

    let invalid = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call",
               "params": {"name": "ispw_list_assignments", "arguments": {"level": "QA"}}}),
    )
    .await;
    assert_eq!(invalid["error"]["data"]["details"]["field"], "level");
    assert_eq!(invalid["error"]["data"]["details"]["constraint"], "enum");

    let unknown = call(
        &server,
        json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call",
               "params": {"name": "ispw_list_set", "arguments": {}}}),
    )
    .await;
    assert!(unknown["error"]["data"]["details"]["did_you_mean"].is_array());
}

#[tokio::test]
async fn protocol_errors_and_notifications() {
    let server = server_with(MockTransport::json(200, json!({})));

    let parse = server.handle_line("{not json").await.expect("response");
    assert_eq!(serde_json::to_value(&parse).expect("json")["error"]["code"], -32700);

    let invalid = call(&server, json!({"id": 1})).await;
    assert_eq!(invalid["error"]["code"], -32600);

    let unknown = call(&server, json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"})).await;
    assert_eq!(unknown["error"]["code"], -32601);

    let null_id = call(&server, json!({"jsonrpc": "2.0", "id": null, "method": "ping"})).await;
    assert!(null_id["id"].is_null());
    assert_eq!(null_id["result"], json!({}));

    let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    assert!(server.handle_line(&notification.to_string()).await.is_none());
    assert!(server.handle_line("   ").await.is_none());

    let init = call(&server, json!({"jsonrpc": "2.0", "id": 4, "method": "initialize", "params": {}})).await;
    assert_eq!(init["result"]["serverInfo"]["name"], "ispw-mcp");
    assert!(init["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn serve_answers_every_request_over_a_stream() {
    let server = server_with(MockTransport::json(200, json!([])));
    let (client, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let handle = tokio::spawn(async move { server.serve(server_read, server_write).await });

    let (client_read, mut client_write) = tokio::io::split(client);
    let requests = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
               "params": {"name": "ispw_list_sets", "arguments": {}}}),
    ];
    for request in &requests {
        client_write
            .write_all(format!("{}\n", request).as_bytes())
            .await
            .expect("write");
    }
    client_write.shutdown().await.expect("shutdown");

    let mut lines = BufReader::new(client_read).lines();
    let mut ids = Vec::new();
    while let Some(line) = lines.next_line().await.expect("read") {
        let value: Value = serde_json::from_str(&line).expect("json line");
        ids.push(value["id"].as_i64().expect("id"));
        if value["id"] == 3 {
            assert_eq!(
                value["result"]["content"][0]["text"],
                "No sets found for SRID 'ISPW'."
            );
        }
    }
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3]);
    handle.await.expect("join").expect("serve");
}
