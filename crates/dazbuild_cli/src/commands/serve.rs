//! JSON-lines tool dispatcher.
//!
//! Each stdin line is a request `{"tool": "<name>", "args": {...}}`. Each
//! request gets exactly one stdout line: `{"ok": true, "result": ...}` or
//! `{"ok": false, "error": {"kind", "message", "suggestion"}}`.

use anyhow::Result;
use dazbuild_core::{DazError, ElementKind, Registry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{debug, info};

/// Tool names accepted by [`dispatch`].
pub const TOOLS: &[&str] = &[
    "guidelines",
    "list_repositories",
    "open_repository",
    "close_repository",
    "start_change",
    "end_change",
    "outline",
    "get",
    "write",
    "add",
    "search",
    "force_abort",
    "session_status",
    "check",
];

#[derive(Debug, Deserialize)]
struct Request {
    tool: String,
    #[serde(default)]
    args: Value,
}

/// Error half of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ToolError {
    fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
            suggestion: None,
        }
    }
}

impl From<DazError> for ToolError {
    fn from(err: DazError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            suggestion: err.recovery_suggestion().map(str::to_string),
        }
    }
}

#[derive(Deserialize)]
struct NameArgs {
    name: String,
}

#[derive(Deserialize)]
struct EndArgs {
    name: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct OutlineArgs {
    name: String,
    #[serde(default)]
    reference: Option<String>,
}

#[derive(Deserialize)]
struct GetArgs {
    name: String,
    reference: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    name: String,
    reference: String,
    content: String,
}

#[derive(Deserialize)]
struct AddArgs {
    name: String,
    #[serde(rename = "type", alias = "kind", deserialize_with = "element_kind")]
    kind: ElementKind,
    #[serde(default)]
    parent_reference: String,
    object_name: String,
    content: String,
}

#[derive(Deserialize)]
struct SearchArgs {
    name: String,
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

fn element_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ElementKind, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

fn args<T: DeserializeOwned>(tool: &str, value: Value) -> Result<T, ToolError> {
    let value = if value.is_null() { json!({}) } else { value };
    serde_json::from_value(value)
        .map_err(|e| ToolError::new("InvalidArguments", format!("{}: {}", tool, e)))
}

fn to_result<T: Serialize>(value: T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::new("InternalError", e.to_string()))
}

/// Runs one tool call against the registry.
pub fn dispatch(registry: &mut Registry, tool: &str, raw: Value) -> Result<Value, ToolError> {
    debug!(tool, "Dispatching tool call");
    match tool {
        "guidelines" => to_result(registry.guidelines()),
        "list_repositories" => to_result(registry.list_repositories()),
        "open_repository" => {
            let a: NameArgs = args(tool, raw)?;
            to_result(registry.open_repository(&a.name)?)
        }
        "close_repository" => {
            let a: NameArgs = args(tool, raw)?;
            registry.close_repository(&a.name)?;
            Ok(json!({ "closed": true }))
        }
        "start_change" => {
            let a: NameArgs = args(tool, raw)?;
            let session_id = registry.start_change(&a.name)?;
            Ok(json!({ "session_id": session_id }))
        }
        "end_change" => {
            let a: EndArgs = args(tool, raw)?;
            to_result(registry.end_change(&a.name, a.message.as_deref())?)
        }
        "outline" => {
            let a: OutlineArgs = args(tool, raw)?;
            to_result(registry.outline(&a.name, a.reference.as_deref())?)
        }
        "get" => {
            let a: GetArgs = args(tool, raw)?;
            to_result(registry.get(&a.name, &a.reference)?)
        }
        "write" => {
            let a: WriteArgs = args(tool, raw)?;
            registry.write(&a.name, &a.reference, &a.content)?;
            Ok(json!({ "staged": a.reference }))
        }
        "add" => {
            let a: AddArgs = args(tool, raw)?;
            let reference = registry.add(
                &a.name,
                a.kind,
                &a.parent_reference,
                &a.object_name,
                &a.content,
            )?;
            Ok(json!({ "staged": reference }))
        }
        "search" => {
            let a: SearchArgs = args(tool, raw)?;
            to_result(registry.search(&a.name, &a.query, a.limit)?)
        }
        "force_abort" => {
            let a: NameArgs = args(tool, raw)?;
            registry.force_abort(&a.name)?;
            Ok(json!({ "aborted": true }))
        }
        "session_status" => {
            let a: NameArgs = args(tool, raw)?;
            to_result(registry.session_status(&a.name)?)
        }
        "check" => {
            let a: NameArgs = args(tool, raw)?;
            to_result(registry.check(&a.name)?)
        }
        other => Err(ToolError {
            kind: "UnknownTool".to_string(),
            message: format!("unknown tool: {}", other),
            suggestion: Some(format!("Available tools: {}", TOOLS.join(", "))),
        }),
    }
}

/// Handles one request line and returns the response object.
pub fn handle_line(registry: &mut Registry, line: &str) -> Value {
    let result = serde_json::from_str::<Request>(line)
        .map_err(|e| ToolError::new("InvalidRequest", e.to_string()))
        .and_then(|request| dispatch(registry, &request.tool, request.args));

    match result {
        Ok(result) => json!({ "ok": true, "result": result }),
        Err(error) => json!({ "ok": false, "error": error }),
    }
}

/// Serve tool calls until stdin closes.
pub fn run(config: Option<&Path>) -> Result<()> {
    let config = super::load_config(config)?;
    let mut registry = Registry::new(&config);
    info!(
        repositories = registry.list_repositories().len(),
        "Serving tool calls on stdin"
    );

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&mut registry, &line);
        serde_json::to_writer(&mut stdout, &response)?;
        writeln!(stdout)?;
        stdout.flush()?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}
