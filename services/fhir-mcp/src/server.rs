//! Line-delimited JSON-RPC 2.0 server
//!
//! One request per line on the reader, one response per line on the writer.
//! Notifications get no response.

use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::tools::{Tools, tool_definitions};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "fhir-mcp";

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": error.code, "message": error.message}
    })
}

/// Handle one input line. Returns the response to write, if any.
pub async fn handle_line(tools: &Tools, line: &str) -> Option<Value> {
    let incoming: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Some(error_response(
                Value::Null,
                RpcError::parse_error(format!("Parse error: {e}")),
            ));
        }
    };

    let Some(obj) = incoming.as_object() else {
        return Some(error_response(
            Value::Null,
            RpcError::invalid_request("Request must be a JSON object"),
        ));
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        let id = obj.get("id").cloned().unwrap_or(Value::Null);
        return Some(error_response(
            id,
            RpcError::invalid_request("jsonrpc must be '2.0'"),
        ));
    }

    // Responses from the client carry no method; nothing to answer.
    let method = obj.get("method").and_then(Value::as_str)?;
    let params = obj.get("params").cloned().unwrap_or(Value::Null);

    let Some(id) = obj.get("id").cloned() else {
        debug!(method, "ignoring notification");
        return None;
    };

    Some(match handle_request(tools, method, params).await {
        Ok(result) => success_response(id, result),
        Err(err) => error_response(id, err),
    })
}

async fn handle_request(tools: &Tools, method: &str, params: Value) -> Result<Value, RpcError> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")}
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({"tools": tool_definitions()})),
        "tools/call" => handle_tools_call(tools, params).await,
        _ => Err(RpcError::method_not_found(method)),
    }
}

async fn handle_tools_call(tools: &Tools, params: Value) -> Result<Value, RpcError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params("tools/call requires a string 'name'"))?;
    let args = match params.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(RpcError::invalid_params("'arguments' must be an object")),
    };

    let output = tools.call(name, &args).await;
    Ok(json!({
        "content": [{"type": "text", "text": output.text}],
        "isError": output.is_error
    }))
}

/// Serve requests until the reader hits EOF.
///
/// A line that is not valid UTF-8 gets a parse error reply; only I/O
/// failures on the streams end the loop.
pub async fn serve<R, W>(tools: &Tools, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(tools, line.trim_end()).await,
            Err(e) => {
                warn!(error = %e, "discarding non UTF-8 input line");
                Some(error_response(
                    Value::Null,
                    RpcError::parse_error(format!("Parse error: {e}")),
                ))
            }
        };

        if let Some(response) = response {
            let mut bytes = response.to_string().into_bytes();
            bytes.push(b'\n');
            writer.write_all(&bytes).await?;
            writer.flush().await?;
        }
    }
    info!("input closed, stopping server");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir_auth::{AuthConfig, CredentialManager};
    use fhir_gateway::Gateway;
    use std::sync::Arc;

    fn test_tools() -> Tools {
        let config = AuthConfig::new(
            "client-1",
            "https://auth.example.com/authorize",
            "https://auth.example.com/oauth/token",
            "http://127.0.0.1:9",
        );
        let manager = CredentialManager::new(config, reqwest::Client::new());
        Tools::new(Arc::new(Gateway::new(Arc::new(manager))))
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let tools = test_tools();
        let response = handle_line(&tools, r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#)
            .await
            .unwrap();
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["serverInfo"]["name"], "fhir-mcp");
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn tools_list_contains_catalogue() {
        let tools = test_tools();
        let response = handle_line(&tools, r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#)
            .await
            .unwrap();
        let listed = response["result"]["tools"].as_array().unwrap();
        assert_eq!(listed.len(), tool_definitions().len());
        assert!(listed.iter().any(|t| t["name"] == "execute_query"));
        assert!(listed[0].get("inputSchema").is_some());
    }

    #[tokio::test]
    async fn tools_call_wraps_output_as_text_content() {
        let tools = test_tools();
        let response = handle_line(
            &tools,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"list_sources"}}"#,
        )
        .await
        .unwrap();
        let result = &response["result"];
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["type"], "text");
        assert!(
            result["content"][0]["text"]
                .as_str()
                .unwrap()
                .starts_with("Error: ")
        );
    }

    #[tokio::test]
    async fn tools_call_requires_name() {
        let tools = test_tools();
        let response = handle_line(
            &tools,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{}}"#,
        )
        .await
        .unwrap();
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let tools = test_tools();
        let response = handle_line(&tools, r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["id"], 4);
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let tools = test_tools();
        let response = handle_line(&tools, "{not json").await.unwrap();
        assert_eq!(response["error"]["code"], -32700);
        assert!(response["id"].is_null());
    }

    #[tokio::test]
    async fn wrong_version_is_invalid_request() {
        let tools = test_tools();
        let response = handle_line(&tools, r#"{"jsonrpc":"1.0","id":5,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let tools = test_tools();
        let response = handle_line(
            &tools,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn serve_writes_one_line_per_request() {
        let tools = test_tools();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n"
        );
        let mut output = Vec::new();
        serve(&tools, input.as_bytes(), &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["id"], 2);
        assert_eq!(lines[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn invalid_utf8_line_gets_parse_error_and_serving_continues() {
        let tools = test_tools();
        let mut input = Vec::new();
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
        input.push(b'\n');
        input.extend_from_slice(b"\xff\xfe\n");
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#);
        input.push(b'\n');

        let mut output = Vec::new();
        serve(&tools, input.as_slice(), &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["error"]["code"], -32700);
        assert!(lines[1]["id"].is_null());
        assert_eq!(lines[2]["id"], 2);
    }

    #[tokio::test]
    async fn final_line_without_newline_is_served() {
        let tools = test_tools();
        let input = r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#;
        let mut output = Vec::new();
        serve(&tools, input.as_bytes(), &mut output).await.unwrap();

        let response: Value = serde_json::from_str(String::from_utf8(output).unwrap().trim()).unwrap();
        assert_eq!(response["id"], 7);
    }
}
