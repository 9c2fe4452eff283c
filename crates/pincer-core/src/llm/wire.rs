//! OpenAI-compatible chat-completion wire format.
//!
//! Request bodies are built as `serde_json::Value`; responses are decoded
//! into private serde structs and mapped to [`LlmResponse`].

use serde::Deserialize;
use serde_json::{Value, json};

use pincer_types::llm::{LlmError, LlmResponse, Message, RequestOptions, ToolCall, Usage};
use pincer_types::tool::{ToolArguments, ToolDefinition};

/// Model families that reject `max_tokens` in favour of
/// `max_completion_tokens`.
const COMPLETION_TOKENS_MODELS: [&str; 2] = ["glm", "o1"];

/// Build the JSON body for `POST {base}/chat/completions`.
pub fn build_request_body(
    model: &str,
    messages: &[Message],
    tools: &[ToolDefinition],
    options: &RequestOptions,
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages.iter().map(encode_message).collect::<Vec<_>>(),
    });

    if !tools.is_empty() {
        body["tools"] = Value::Array(tools.iter().map(encode_tool).collect());
        body["tool_choice"] = json!("auto");
    }

    if let Some(max_tokens) = options.max_tokens {
        let lower = model.to_lowercase();
        let key = if COMPLETION_TOKENS_MODELS.iter().any(|m| lower.contains(m)) {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };
        body[key] = json!(max_tokens);
    }

    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }

    body
}

fn encode_message(message: &Message) -> Value {
    let mut value = json!({
        "role": message.role.to_string(),
        "content": message.content,
    });
    if let Some(id) = &message.tool_call_id {
        value["tool_call_id"] = json!(id);
    }
    if !message.tool_calls.is_empty() {
        value["tool_calls"] = Value::Array(
            message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_json_string(),
                        }
                    })
                })
                .collect(),
        );
    }
    value
}

fn encode_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

/// Either the standard `{id, type: "function", function: {..}}` shape or
/// the legacy flat `{id, name, arguments}` shape.
#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(default)]
    function: Option<WireFunction>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Decode a successful chat-completion body.
///
/// Zero choices is not an error: it yields empty content with finish
/// reason `"stop"`.
pub fn parse_response(body: &str) -> Result<LlmResponse, LlmError> {
    let wire: WireResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Deserialization(e.to_string()))?;

    let Some(choice) = wire.choices.into_iter().next() else {
        return Ok(LlmResponse {
            content: String::new(),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
            usage: wire.usage,
        });
    };

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(decode_tool_call)
        .collect();

    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        usage: wire.usage,
    })
}

fn decode_tool_call(call: WireToolCall) -> ToolCall {
    let (name, arguments) = match call.function {
        Some(function) => (function.name, function.arguments),
        None => (call.name.unwrap_or_default(), call.arguments),
    };
    ToolCall {
        id: call.id,
        name,
        arguments: decode_arguments(arguments),
    }
}

fn decode_arguments(arguments: Option<Value>) -> ToolArguments {
    match arguments {
        None | Some(Value::Null) => ToolArguments::new(),
        Some(Value::String(text)) => ToolArguments::parse(&text),
        Some(Value::Object(map)) => map.into_iter().map(|(k, v)| (k, v.into())).collect(),
        Some(other) => ToolArguments::raw(other.to_string()),
    }
}
