//! Tool catalogue exposed to the assistant
//!
//! Each tool maps its declared arguments to one credential-manager or
//! gateway call and wraps the JSON result as text. Failures never escape
//! as protocol errors; they come back as `Error: ...` tool output.

use std::sync::Arc;

use fhir_auth::{Credential, generate_state};
use fhir_gateway::{Gateway, Method};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::error::{Result, ToolError};

/// Text result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn json(value: &Value) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::text(text)
    }

    fn error(err: &ToolError) -> Self {
        let mut text = format!("Error: {err}");
        if err.requires_reauthentication() {
            text.push_str(
                "\nAuthenticate again with sign_in, exchange_code or set_access_token.",
            );
        }
        Self {
            text,
            is_error: true,
        }
    }
}

/// Name, description and JSON schema advertised by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn tool(name: &'static str, description: &'static str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name,
        description,
        input_schema,
    }
}

fn no_args() -> Value {
    json!({"type": "object", "properties": {}})
}

fn string_args(names: &[(&str, &str)]) -> Value {
    let properties: Map<String, Value> = names
        .iter()
        .map(|(name, description)| {
            (
                name.to_string(),
                json!({"type": "string", "description": description}),
            )
        })
        .collect();
    let required: Vec<&str> = names.iter().map(|(name, _)| *name).collect();
    json!({"type": "object", "properties": properties, "required": required})
}

/// Every tool the server offers, in the order `tools/list` reports them.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "get_authorization_url",
            "Build the browser URL that starts the OAuth authorization-code flow.",
            json!({
                "type": "object",
                "properties": {
                    "state": {"type": "string", "description": "Anti-forgery value; generated when omitted"}
                }
            }),
        ),
        tool(
            "exchange_code",
            "Exchange an authorization code from the OAuth redirect for an access token.",
            string_args(&[("code", "Authorization code from the redirect")]),
        ),
        tool(
            "sign_in",
            "Sign in with a username and password.",
            string_args(&[("username", "Account user name"), ("password", "Account password")]),
        ),
        tool(
            "set_access_token",
            "Use an access token obtained elsewhere.",
            json!({
                "type": "object",
                "properties": {
                    "access_token": {"type": "string"},
                    "persist": {"type": "boolean", "description": "Also save the token to disk"}
                },
                "required": ["access_token"]
            }),
        ),
        tool("clear_token", "Forget the current credential.", no_args()),
        tool(
            "auth_status",
            "Report whether a credential is held and whether the API accepts it.",
            no_args(),
        ),
        tool("list_sources", "List configured data sources.", no_args()),
        tool(
            "get_source",
            "Fetch one data source.",
            string_args(&[("source_id", "Source identifier")]),
        ),
        tool(
            "create_source",
            "Create a data source.",
            json!({
                "type": "object",
                "properties": {"source": {"type": "object"}},
                "required": ["source"]
            }),
        ),
        tool(
            "update_source",
            "Replace a data source definition.",
            json!({
                "type": "object",
                "properties": {
                    "source_id": {"type": "string"},
                    "source": {"type": "object"}
                },
                "required": ["source_id", "source"]
            }),
        ),
        tool(
            "delete_source",
            "Delete a data source.",
            string_args(&[("source_id", "Source identifier")]),
        ),
        tool(
            "list_resources",
            "List FHIR resources of one type.",
            json!({
                "type": "object",
                "properties": {
                    "resource_type": {"type": "string", "description": "FHIR resource type, e.g. Patient"},
                    "source_id": {"type": "string"},
                    "count": {"type": "integer", "minimum": 1}
                },
                "required": ["resource_type"]
            }),
        ),
        tool(
            "get_resource",
            "Fetch one FHIR resource.",
            string_args(&[("resource_type", "FHIR resource type"), ("id", "Resource id")]),
        ),
        tool(
            "get_resource_graph",
            "Fetch a FHIR resource together with the resources it references.",
            string_args(&[("resource_type", "FHIR resource type"), ("id", "Resource id")]),
        ),
        tool(
            "get_composition",
            "Fetch the clinical summary composition for a patient.",
            string_args(&[("patient_id", "Patient resource id")]),
        ),
        tool(
            "execute_query",
            "Run a structured query descriptor against the query endpoint.",
            json!({
                "type": "object",
                "properties": {"query": {"type": "object"}},
                "required": ["query"]
            }),
        ),
        tool("list_dashboards", "List saved dashboards.", no_args()),
        tool(
            "create_dashboard",
            "Create a dashboard.",
            json!({
                "type": "object",
                "properties": {"dashboard": {"type": "object"}},
                "required": ["dashboard"]
            }),
        ),
        tool(
            "delete_account",
            "Permanently delete the signed-in account and forget its credential.",
            no_args(),
        ),
    ]
}

/// Dispatches tool calls onto the shared gateway and credential manager.
pub struct Tools {
    gateway: Arc<Gateway>,
}

impl Tools {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Run one tool. Errors are rendered into the output, never returned.
    pub async fn call(&self, name: &str, args: &Map<String, Value>) -> ToolOutput {
        match self.dispatch(name, args).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                ToolOutput::error(&e)
            }
        }
    }

    async fn dispatch(&self, name: &str, args: &Map<String, Value>) -> Result<ToolOutput> {
        let manager = self.gateway.manager();
        match name {
            "get_authorization_url" => {
                let state = optional_str(args, "state")?
                    .map(str::to_owned)
                    .unwrap_or_else(generate_state);
                let url = manager.authorization_url(Some(state.as_str()))?;
                Ok(ToolOutput::json(&json!({"url": url.as_str(), "state": state})))
            }
            "exchange_code" => {
                let code = required_str(args, "code")?;
                let credential = manager.exchange_code(code).await?;
                info!("authenticated via authorization code");
                Ok(ToolOutput::json(&credential_summary(&credential)))
            }
            "sign_in" => {
                let username = required_str(args, "username")?;
                let password = required_str(args, "password")?;
                let credential = manager.sign_in(username, password).await?;
                info!("authenticated via sign-in");
                Ok(ToolOutput::json(&credential_summary(&credential)))
            }
            "set_access_token" => {
                let token = required_str(args, "access_token")?;
                manager.set_access_token(token).await;
                if optional_bool(args, "persist")?.unwrap_or(false) {
                    manager.persist().await?;
                }
                Ok(ToolOutput::text("Access token set."))
            }
            "clear_token" => {
                manager.clear_token().await;
                Ok(ToolOutput::text("Credential cleared."))
            }
            "auth_status" => self.auth_status().await,
            "list_sources" => self.get("/sources").await,
            "get_source" => {
                let id = segment(args, "source_id")?;
                self.get(&format!("/sources/{id}")).await
            }
            "create_source" => {
                let source = required_object(args, "source")?;
                self.send("/sources", Method::POST, Some(source)).await
            }
            "update_source" => {
                let id = segment(args, "source_id")?;
                let source = required_object(args, "source")?;
                self.send(&format!("/sources/{id}"), Method::PUT, Some(source))
                    .await
            }
            "delete_source" => {
                let id = segment(args, "source_id")?;
                self.send(&format!("/sources/{id}"), Method::DELETE, None)
                    .await
            }
            "list_resources" => {
                let resource_type = segment(args, "resource_type")?;
                let mut query = Vec::new();
                if let Some(source) = optional_str(args, "source_id")? {
                    query.push(format!("source={}", urlencoding::encode(source)));
                }
                if let Some(count) = optional_count(args, "count")? {
                    query.push(format!("_count={count}"));
                }
                let mut path = format!("/fhir/{resource_type}");
                if !query.is_empty() {
                    path.push('?');
                    path.push_str(&query.join("&"));
                }
                self.get(&path).await
            }
            "get_resource" => {
                let resource_type = segment(args, "resource_type")?;
                let id = segment(args, "id")?;
                self.get(&format!("/fhir/{resource_type}/{id}")).await
            }
            "get_resource_graph" => {
                let resource_type = segment(args, "resource_type")?;
                let id = segment(args, "id")?;
                self.get(&format!("/fhir/{resource_type}/{id}/graph")).await
            }
            "get_composition" => {
                let patient = segment(args, "patient_id")?;
                self.get(&format!("/fhir/Patient/{patient}/composition"))
                    .await
            }
            "execute_query" => {
                let query = required_object(args, "query")?;
                let result = self.gateway.query(query).await?;
                Ok(ToolOutput::json(&result))
            }
            "list_dashboards" => self.get("/dashboards").await,
            "create_dashboard" => {
                let dashboard = required_object(args, "dashboard")?;
                self.send("/dashboards", Method::POST, Some(dashboard)).await
            }
            "delete_account" => {
                self.gateway.call("/account", Method::DELETE, None).await?;
                manager.clear_token().await;
                info!("account deleted");
                Ok(ToolOutput::text("Account deleted and credential cleared."))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn get(&self, path: &str) -> Result<ToolOutput> {
        self.send(path, Method::GET, None).await
    }

    async fn send(&self, path: &str, method: Method, body: Option<&Value>) -> Result<ToolOutput> {
        let result = self.gateway.call(path, method, body).await?;
        Ok(ToolOutput::json(&result))
    }

    async fn auth_status(&self) -> Result<ToolOutput> {
        let manager = self.gateway.manager();
        let token_file = manager
            .token_store()
            .map(|store| store.path().display().to_string());
        let Some(credential) = manager.credential().await else {
            return Ok(ToolOutput::json(
                &json!({"authenticated": false, "token_file": token_file}),
            ));
        };

        // Tokens with expiry metadata are checked locally (refreshing if due);
        // bare tokens can only be checked by asking the API.
        let valid = if credential.expires_at().is_some() {
            manager.current_access_token().await.is_ok()
        } else {
            self.gateway.probe_validity().await
        };

        let mut status = credential_summary(&credential);
        status["valid"] = Value::Bool(valid);
        status["authenticated"] = Value::Bool(manager.is_authenticated().await);
        status["token_file"] = json!(token_file);
        Ok(ToolOutput::json(&status))
    }
}

/// Credential metadata that is safe to show; never includes token values.
fn credential_summary(credential: &Credential) -> Value {
    json!({
        "authenticated": true,
        "token_type": credential.token_type,
        "expires_at": credential.expires_at(),
        "scope": credential.scope,
        "patient": credential.patient,
        "has_refresh_token": credential.refresh_token.is_some(),
    })
}

fn optional_str<'a>(args: &'a Map<String, Value>, name: &'static str) -> Result<Option<&'a str>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ToolError::InvalidArgument {
            name,
            reason: "expected a string".into(),
        }),
    }
}

fn required_str<'a>(args: &'a Map<String, Value>, name: &'static str) -> Result<&'a str> {
    match optional_str(args, name)? {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ToolError::MissingArgument(name)),
    }
}

/// A required string argument, percent-encoded for use as one path segment.
fn segment(args: &Map<String, Value>, name: &'static str) -> Result<String> {
    required_str(args, name).map(|s| urlencoding::encode(s).into_owned())
}

fn required_object<'a>(args: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value> {
    match args.get(name) {
        None | Some(Value::Null) => Err(ToolError::MissingArgument(name)),
        Some(value @ Value::Object(_)) => Ok(value),
        Some(_) => Err(ToolError::InvalidArgument {
            name,
            reason: "expected an object".into(),
        }),
    }
}

fn optional_bool(args: &Map<String, Value>, name: &'static str) -> Result<Option<bool>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ToolError::InvalidArgument {
            name,
            reason: "expected a boolean".into(),
        }),
    }
}

fn optional_count(args: &Map<String, Value>, name: &'static str) -> Result<Option<u64>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_u64() {
            Some(n) if n > 0 => Ok(Some(n)),
            _ => Err(ToolError::InvalidArgument {
                name,
                reason: "expected a positive integer".into(),
            }),
        },
    }
}
