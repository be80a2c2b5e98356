//! OpenAI-compatible chat-completions decision client.
//!
//! Renders the transcript as a chat message list with function-calling
//! blocks, posts it to `{base_url}/chat/completions`, and parses exactly
//! one tool call out of the response. Works against any endpoint speaking
//! the OpenAI wire format.

use reqwest::StatusCode;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use apply_core::tools::{ToolCall, ToolDefinition};
use apply_core::transcript::{Transcript, TranscriptEntry};
use async_trait::async_trait;

use crate::decision::{Decision, DecisionClient, DecisionError, DecisionRequest};

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Decision client for OpenAI-compatible endpoints.
pub struct OpenAiDecisionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiDecisionClient {
    /// Create a client for the given endpoint.
    ///
    /// `base_url` is the API root (e.g. `https://api.openai.com/v1`);
    /// trailing slashes are tolerated.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, DecisionError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// The configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl DecisionClient for OpenAiDecisionClient {
    #[instrument(skip_all, fields(model = %self.model, entries = request.transcript.len()))]
    async fn decide(&self, request: &DecisionRequest<'_>) -> Result<Decision, DecisionError> {
        let payload = json!({
            "model": self.model,
            "messages": build_messages(request.system_prompt, request.transcript),
            "tools": request.tools.iter().map(wire_tool).collect::<Vec<_>>(),
            "tool_choice": "auto",
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().await.unwrap_or_default();
            return Err(DecisionError::Http {
                status: status.as_u16(),
                message: truncate(&message, 300),
            });
        }

        let body: Value = response.json().await?;
        let decision = parse_decision(&body)?;
        debug!(tool = %decision.call.name, "decision received");
        Ok(decision)
    }
}

/// Render the transcript as an OpenAI chat message list.
///
/// Decisions become assistant `tool_calls` entries with synthesized IDs
/// (`call_{index}_{name}`); the observation that follows each decision
/// becomes the paired `tool` message. Leading observations are `user`
/// messages, system notes are `system` messages.
#[must_use]
pub fn build_messages(system_prompt: &str, transcript: &Transcript) -> Vec<Value> {
    let mut messages = vec![json!({"role": "system", "content": system_prompt})];
    let mut decision_index = 0usize;
    let mut open_call_id: Option<String> = None;

    for entry in transcript.entries() {
        match entry {
            TranscriptEntry::Decision { call } => {
                let id = format!("call_{decision_index}_{}", call.name);
                decision_index += 1;
                messages.push(json!({
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": Value::Object(call.arguments.clone()).to_string(),
                        },
                    }],
                }));
                open_call_id = Some(id);
            }
            TranscriptEntry::Observation { text, .. } => {
                if let Some(id) = open_call_id.take() {
                    messages.push(json!({
                        "role": "tool",
                        "tool_call_id": id,
                        "content": text,
                    }));
                } else {
                    messages.push(json!({"role": "user", "content": text}));
                }
            }
            TranscriptEntry::SystemNote { text } => {
                messages.push(json!({"role": "system", "content": text}));
            }
        }
    }

    messages
}

/// Convert a tool definition to the OpenAI function declaration format.
#[must_use]
pub fn wire_tool(def: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": def.parameters,
        },
    })
}

/// Parse exactly one tool call out of a chat-completions response body.
fn parse_decision(body: &Value) -> Result<Decision, DecisionError> {
    let message = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| DecisionError::Malformed {
            message: "response has no choices[0].message".into(),
        })?;

    let commentary = message
        .get("content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let Some(raw_call) = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .and_then(|calls| calls.first())
    else {
        return Err(DecisionError::Malformed {
            message: "response contains no tool call".into(),
        });
    };

    let function = raw_call
        .get("function")
        .ok_or_else(|| DecisionError::Malformed {
            message: "tool call has no function block".into(),
        })?;
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| DecisionError::Malformed {
            message: "tool call has no function name".into(),
        })?;

    // Arguments arrive either as a JSON-encoded string or as an object.
    let arguments: Map<String, Value> = match function.get("arguments") {
        Some(Value::String(s)) if !s.is_empty() => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .ok_or_else(|| DecisionError::Malformed {
                message: format!("tool call arguments are not a JSON object: {}", truncate(s, 120)),
            })?,
        Some(Value::Object(map)) => map.clone(),
        None | Some(Value::String(_) | Value::Null) => Map::new(),
        Some(other) => {
            return Err(DecisionError::Malformed {
                message: format!("unexpected arguments type: {other}"),
            });
        }
    };

    Ok(Decision {
        call: ToolCall::new(name, arguments),
        commentary,
    })
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_owned()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apply_core::transcript::TranscriptEntry;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_transcript() -> Transcript {
        let mut t = Transcript::new();
        t.push(TranscriptEntry::observation("Apply to Acme at https://a.test"));
        let mut args = Map::new();
        let _ = args.insert("url".into(), json!("https://a.test"));
        t.push(TranscriptEntry::decision(ToolCall::new("goto", args)));
        t.push(TranscriptEntry::observation("Navigated to https://a.test"));
        t.push(TranscriptEntry::system_note("status: navigating"));
        t
    }

    #[test]
    fn messages_pair_decisions_with_tool_results() {
        let messages = build_messages("You are an agent.", &sample_transcript());

        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        let call_id = messages[2]["tool_calls"][0]["id"].as_str().unwrap();
        assert_eq!(call_id, "call_0_goto");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], call_id);
        assert_eq!(messages[4]["role"], "system");
    }

    #[test]
    fn decision_arguments_are_encoded_as_string() {
        let messages = build_messages("sys", &sample_transcript());
        let args = messages[2]["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .unwrap();
        let parsed: Value = serde_json::from_str(args).unwrap();
        assert_eq!(parsed["url"], "https://a.test");
    }

    #[test]
    fn wire_tool_shape() {
        let def = apply_tools::contract::ToolName::Goto.definition();
        let wire = wire_tool(&def);
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "goto");
        assert_eq!(wire["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn parse_decision_with_string_arguments() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": "Navigating now.",
                    "tool_calls": [{
                        "id": "x",
                        "type": "function",
                        "function": {"name": "goto", "arguments": "{\"url\": \"https://a.test\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let decision = parse_decision(&body).unwrap();
        assert_eq!(decision.call.name, "goto");
        assert_eq!(decision.call.arguments["url"], "https://a.test");
        assert_eq!(decision.commentary.as_deref(), Some("Navigating now."));
    }

    #[test]
    fn parse_decision_with_object_arguments() {
        let body = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "function": {"name": "click", "arguments": {"target": "Apply"}}
                    }]
                }
            }]
        });
        let decision = parse_decision(&body).unwrap();
        assert_eq!(decision.call.arguments["target"], "Apply");
    }

    #[test]
    fn parse_decision_without_tool_call_is_malformed() {
        let body = json!({
            "choices": [{"message": {"content": "I am thinking."}}]
        });
        let err = parse_decision(&body).unwrap_err();
        assert_matches::assert_matches!(err, DecisionError::Malformed { .. });
        assert!(err.is_retryable());
    }

    #[test]
    fn parse_decision_with_bad_argument_string() {
        let body = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{"function": {"name": "goto", "arguments": "not json"}}]
                }
            }]
        });
        assert_matches::assert_matches!(
            parse_decision(&body),
            Err(DecisionError::Malformed { .. })
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 100), "short");
        let long = "a".repeat(400);
        assert_eq!(truncate(&long, 10).len(), 13);
    }

    #[tokio::test]
    async fn decide_against_mock_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "test-model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "tool_calls": [{
                            "id": "c1",
                            "type": "function",
                            "function": {"name": "page_snapshot", "arguments": "{}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let client = OpenAiDecisionClient::new(server.uri(), "key", "test-model").unwrap();
        let transcript = Transcript::new();
        let tools = apply_tools::contract::definitions();
        let request = DecisionRequest {
            system_prompt: "sys",
            transcript: &transcript,
            tools: &tools,
        };

        let decision = client.decide(&request).await.unwrap();
        assert_eq!(decision.call.name, "page_snapshot");
    }

    #[tokio::test]
    async fn decide_maps_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = OpenAiDecisionClient::new(server.uri(), "key", "test-model").unwrap();
        let transcript = Transcript::new();
        let tools = vec![];
        let request = DecisionRequest {
            system_prompt: "sys",
            transcript: &transcript,
            tools: &tools,
        };

        let err = client.decide(&request).await.unwrap_err();
        assert_matches::assert_matches!(err, DecisionError::Http { status: 503, .. });
        assert!(err.is_retryable());
    }
}
