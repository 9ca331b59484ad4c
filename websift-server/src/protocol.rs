//! JSON-lines protocol: one request per input line, one response per
//! output line, progress notifications interleaved.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use websift::events::{ForwardedEvent, RESEARCH_PROGRESS};
use websift::tools::{
    resource_definitions, tool_definitions, ResearchService, RESEARCH_REPORT_PROMPT,
    RESEARCH_REPORT_PROMPT_NAME,
};

/// Method name of progress notifications.
pub const PROGRESS_NOTIFICATION: &str = "notifications/progress";

/// One request line.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    /// Echoed back in the response.
    #[serde(default)]
    pub id: Value,
    /// `call_tool`, `list_tools`, `list_resources`, `read_resource`,
    /// `list_prompts` or `get_prompt`.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The request id.
    pub id: Value,
    /// The method result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Protocol-level failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Protocol error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub message: String,
}

impl Response {
    fn result(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorBody {
                message: message.into(),
            }),
        }
    }
}

/// A server-initiated message without an id.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Notification kind.
    pub method: &'static str,
    /// Payload.
    pub params: Value,
}

impl Notification {
    fn from_event(event: ForwardedEvent) -> Option<Self> {
        if event.event_type != RESEARCH_PROGRESS {
            return None;
        }
        let message = event
            .data
            .as_ref()
            .and_then(|d| d.get("message"))
            .cloned()
            .unwrap_or(Value::Null);
        Some(Self {
            method: PROGRESS_NOTIFICATION,
            params: json!({
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        })
    }
}

fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key)?.as_str()
}

/// Answers one request.
pub async fn handle(service: &ResearchService, request: Request) -> Response {
    let Request { id, method, params } = request;
    tracing::debug!(method = %method, "Request received");

    match method.as_str() {
        "list_tools" => Response::result(id, json!({ "tools": tool_definitions() })),
        "list_resources" => Response::result(id, json!({ "resources": resource_definitions() })),
        "list_prompts" => Response::result(
            id,
            json!({
                "prompts": [{
                    "name": RESEARCH_REPORT_PROMPT_NAME,
                    "description": "Template for synthesising research results into a cited markdown report."
                }]
            }),
        ),
        "call_tool" => {
            let Some(name) = param_str(&params, "name") else {
                return Response::error(id, "params.name is required");
            };
            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
            let response = service.call_tool(name, &arguments).await;
            Response::result(id, json!(response))
        }
        "read_resource" => {
            let Some(uri) = param_str(&params, "uri") else {
                return Response::error(id, "params.uri is required");
            };
            match service.read_resource(uri) {
                Ok(contents) => Response::result(id, json!({ "uri": uri, "contents": contents })),
                Err(e) => Response::error(id, e.to_string()),
            }
        }
        "get_prompt" => match param_str(&params, "name") {
            Some(RESEARCH_REPORT_PROMPT_NAME) => Response::result(
                id,
                json!({
                    "description": "Research report synthesis template",
                    "messages": [{"role": "user", "content": RESEARCH_REPORT_PROMPT}]
                }),
            ),
            Some(other) => Response::error(id, format!("Unknown prompt: {other}")),
            None => Response::error(id, "params.name is required"),
        },
        other => Response::error(id, format!("Unknown method: {other}")),
    }
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Serves requests from `reader` until end of input.
///
/// Requests are handled concurrently; responses are written in completion
/// order. Progress events arriving on `events` are forwarded as
/// notifications.
pub async fn serve<R, W>(
    reader: R,
    mut writer: W,
    service: ResearchService,
    mut events: mpsc::UnboundedReceiver<ForwardedEvent>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let service = Arc::new(service);
    let (responses_tx, mut responses) = mpsc::unbounded_channel::<Response>();
    let mut lines = reader.lines();
    let mut tasks = JoinSet::new();
    let mut input_open = true;

    loop {
        if !input_open && tasks.is_empty() && responses.is_empty() {
            break;
        }

        tokio::select! {
            biased;
            Some(event) = events.recv() => {
                if let Some(notification) = Notification::from_event(event) {
                    write_line(&mut writer, &notification).await?;
                }
            }
            Some(response) = responses.recv() => write_line(&mut writer, &response).await?,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Request task failed");
                }
            }
            line = lines.next_line(), if input_open => match line? {
                None => {
                    tracing::debug!("Input closed; finishing in-flight requests");
                    input_open = false;
                }
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match serde_json::from_str::<Request>(&line) {
                    Ok(request) => {
                        let service = Arc::clone(&service);
                        let responses = responses_tx.clone();
                        tasks.spawn(async move {
                            let response = handle(&service, request).await;
                            let _ = responses.send(response);
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Malformed request line");
                        let response = Response::error(Value::Null, format!("invalid request: {e}"));
                        write_line(&mut writer, &response).await?;
                    }
                },
            },
            else => break,
        }
    }

    while let Ok(event) = events.try_recv() {
        if let Some(notification) = Notification::from_event(event) {
            write_line(&mut writer, &notification).await?;
        }
    }
    Ok(())
}
