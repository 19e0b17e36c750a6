use serde::Deserialize;
use serde_json::json;

use crate::error::GenerationFault;

use super::retry::classify_failure;
use super::{CopyGenerator, GenerationFuture, GenerationRequest, RawCandidateText, ToolSpec};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TOOL_NAME: &str = "deliver_copy";
const SYSTEM_PROMPT: &str = "You are a senior advertising copywriter. Always answer by calling the deliver_copy tool. Never add commentary.";

#[derive(Debug, Clone)]
pub struct OpenAI {
    key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAI {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CopyGenerator for OpenAI {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> GenerationFuture<'a> {
        Box::pin(async move { call_with_chat_completions(self, request).await })
    }
}

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

pub(crate) fn copy_tool_spec(n: usize) -> ToolSpec {
    ToolSpec {
        name: TOOL_NAME.to_string(),
        description: format!("Deliver exactly {} ad copy variants.", n.max(1)),
        parameters: json!({
            "type": "object",
            "properties": {
                "variants": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "headline": {"type": "string"},
                            "subhead": {"type": "string"},
                            "cta": {"type": "string"},
                            "legal": {"type": "string"}
                        },
                        "required": ["headline", "subhead", "cta", "legal"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["variants"],
            "additionalProperties": false
        }),
    }
}

async fn call_with_chat_completions(
    provider: &OpenAI,
    request: &GenerationRequest,
) -> Result<Vec<RawCandidateText>, GenerationFault> {
    let url = format!("{}/chat/completions", base_url());
    let tool = copy_tool_spec(request.n);

    let body = json!({
        "model": provider.model,
        "temperature": request.temperature,
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": request.prompt}
        ],
        "tools": [
            {
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters
                }
            }
        ],
        "tool_choice": {"type": "function", "function": {"name": tool.name}}
    });

    let response = provider
        .client
        .post(&url)
        .bearer_auth(&provider.key)
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            if err.is_timeout() {
                GenerationFault::Timeout
            } else {
                GenerationFault::Unavailable(format!("OpenAI request failed: {}", err))
            }
        })?;

    let status = response.status();
    let headers = response.headers().clone();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        let detail = extract_openai_error(&text).unwrap_or(text);
        return Err(classify_failure("OpenAI", status, &headers, &detail));
    }
    extract_tool_variants(&text, TOOL_NAME)
}

/// Pulls the `variants` array out of a chat-completions tool call. Each
/// variant is handed on as its JSON text.
pub(crate) fn extract_tool_variants(
    text: &str,
    tool_name: &str,
) -> Result<Vec<RawCandidateText>, GenerationFault> {
    let payload: OpenAIResponse = serde_json::from_str(text).map_err(|err| {
        GenerationFault::Malformed(format!("failed to parse OpenAI response JSON: {}", err))
    })?;
    let tool_call = payload
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or_else(|| GenerationFault::Malformed("no tool call returned from OpenAI".to_string()))?;

    if tool_call.function.name != tool_name {
        return Err(GenerationFault::Malformed(format!(
            "unexpected tool name '{}' from OpenAI",
            tool_call.function.name
        )));
    }

    let args: serde_json::Value =
        serde_json::from_str(&tool_call.function.arguments).map_err(|err| {
            GenerationFault::Malformed(format!("failed to parse OpenAI tool arguments: {}", err))
        })?;
    let variants = args
        .get("variants")
        .and_then(|value| value.as_array())
        .ok_or_else(|| GenerationFault::Malformed("tool arguments lack 'variants'".to_string()))?;

    Ok(variants
        .iter()
        .map(|variant| RawCandidateText::new(variant.to_string()))
        .collect())
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let parts = [
        error.message,
        error.kind.map(|kind| format!("type: {}", kind)),
        error.code.map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect::<Vec<_>>();
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}
