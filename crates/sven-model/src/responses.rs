// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wire conversion for OpenAI's `/responses` dialect.
//!
//! A handful of differences from `/chat/completions`:
//!   • the system prompt travels as a top-level `instructions` string, not a
//!     message with `role: "system"`
//!   • tool calls and their results are flat `function_call` /
//!     `function_call_output` items, addressed by `call_id`, not nested
//!     inside an assistant message
//!   • streaming is a sequence of typed `response.*` events rather than
//!     `choices[].delta` chunks

use serde_json::{json, Value};

use crate::openai_compat::next_complete_lines;
use crate::{CompletionRequest, ContentPart, Message, MessageContent, ResponseEvent, Role, ToolResultContent};

pub(crate) fn build_responses_body(
    req: &CompletionRequest,
    model: &str,
    max_tokens: u32,
    temperature: f32,
    driver_name: &str,
    extra_body: &Value,
) -> Value {
    let (instructions, input) = split_instructions(&req.messages, req.system_dynamic_suffix.as_deref());

    let tools: Vec<Value> = req.tools.iter().map(|t| json!({
        "type": "function",
        "name": t.name,
        "description": t.description,
        "parameters": t.parameters,
    })).collect();

    let mut body = json!({
        "model": model,
        "input": input,
        "stream": req.stream,
        "max_output_tokens": max_tokens,
    });
    if let Some(instructions) = instructions {
        body["instructions"] = json!(instructions);
    }
    // Reasoning models (o1/o3/gpt-5 family) only support the default temperature.
    if driver_name != "openai" || !(model.starts_with("o1-") || model.starts_with("o3-") || model.starts_with("gpt-5")) {
        body["temperature"] = json!(temperature);
    }
    if !tools.is_empty() {
        body["tools"] = json!(tools);
    }
    if let Some(map) = extra_body.as_object() {
        for (k, v) in map {
            body[k] = v.clone();
        }
    }
    body
}

/// Pulls the leading system message out as `instructions`; everything else
/// becomes a `input` item. A whitespace-only system message is dropped
/// rather than sent as an empty `instructions` string, which some backing
/// models reject.
fn split_instructions(messages: &[Message], dynamic_suffix: Option<&str>) -> (Option<String>, Vec<Value>) {
    let mut rest = messages;
    let mut instructions = None;
    if let Some(first) = messages.first() {
        if first.role == Role::System {
            if let MessageContent::Text(t) = &first.content {
                let combined = match dynamic_suffix {
                    Some(suffix) => format!("{t}\n\n{suffix}"),
                    None => t.clone(),
                };
                if !combined.trim().is_empty() {
                    instructions = Some(combined);
                }
                rest = &messages[1..];
            }
        }
    }
    (instructions, build_responses_input(rest))
}

fn build_responses_input(messages: &[Message]) -> Vec<Value> {
    messages.iter().map(|m| match &m.content {
        MessageContent::Text(t) => {
            let kind = if m.role == Role::Assistant { "output_text" } else { "input_text" };
            json!({
                "type": "message",
                "role": role_str(&m.role),
                "content": [{ "type": kind, "text": t }],
            })
        }
        MessageContent::ContentParts(parts) => {
            let kind = if m.role == Role::Assistant { "output_text" } else { "input_text" };
            let content: Vec<Value> = parts.iter().map(|p| match p {
                ContentPart::Text { text } => json!({ "type": kind, "text": text }),
                ContentPart::Image { image_url, .. } => json!({ "type": "input_image", "image_url": image_url }),
            }).collect();
            json!({ "type": "message", "role": role_str(&m.role), "content": content })
        }
        MessageContent::ToolCall { tool_call_id, function } => json!({
            "type": "function_call",
            "call_id": tool_call_id,
            "name": function.name,
            "arguments": function.arguments,
        }),
        MessageContent::ToolResult { tool_call_id, content } => {
            let output = match content {
                ToolResultContent::Text(t) => t.clone(),
                ToolResultContent::Parts(parts) => parts.iter().filter_map(|p| match p {
                    crate::ToolContentPart::Text { text } => Some(text.clone()),
                    crate::ToolContentPart::Image { .. } => None,
                }).collect::<Vec<_>>().join("\n"),
            };
            json!({ "type": "function_call_output", "call_id": tool_call_id, "output": output })
        }
    }).collect()
}

fn role_str(r: &Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

pub(crate) fn drain_responses_sse_lines(buf: &mut String) -> Vec<anyhow::Result<ResponseEvent>> {
    next_complete_lines(buf)
        .into_iter()
        .filter_map(|line| parse_responses_data_line(&line))
        .collect()
}

fn parse_responses_data_line(line: &str) -> Option<anyhow::Result<ResponseEvent>> {
    let data = line.strip_prefix("data: ")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(ResponseEvent::Done));
    }
    let v: Value = serde_json::from_str(data).ok()?;
    Some(parse_responses_event(&v))
}

fn parse_responses_event(v: &Value) -> anyhow::Result<ResponseEvent> {
    match v["type"].as_str().unwrap_or("") {
        "response.output_text.delta" => {
            Ok(ResponseEvent::TextDelta(v["delta"].as_str().unwrap_or("").to_string()))
        }
        "response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
            Ok(ResponseEvent::ThinkingDelta(v["delta"].as_str().unwrap_or("").to_string()))
        }
        "response.output_item.added" => {
            let item = &v["item"];
            if item["type"].as_str() == Some("function_call") {
                let index = v["output_index"].as_u64().unwrap_or(0) as u32;
                return Ok(ResponseEvent::ToolCall {
                    index,
                    id: item["call_id"].as_str().unwrap_or("").to_string(),
                    name: item["name"].as_str().unwrap_or("").to_string(),
                    arguments: String::new(),
                });
            }
            Ok(ResponseEvent::TextDelta(String::new()))
        }
        "response.function_call_arguments.delta" => {
            let index = v["output_index"].as_u64().unwrap_or(0) as u32;
            Ok(ResponseEvent::ToolCall {
                index,
                id: String::new(),
                name: String::new(),
                arguments: v["delta"].as_str().unwrap_or("").to_string(),
            })
        }
        "response.completed" => {
            let usage = &v["response"]["usage"];
            Ok(ResponseEvent::Usage {
                input_tokens: usage["input_tokens"].as_u64().unwrap_or(0) as u32,
                output_tokens: usage["output_tokens"].as_u64().unwrap_or(0) as u32,
                cache_read_tokens: usage["input_tokens_details"]["cached_tokens"].as_u64().unwrap_or(0) as u32,
                cache_write_tokens: 0,
            })
        }
        "response.incomplete" => {
            if v["response"]["incomplete_details"]["reason"].as_str() == Some("max_output_tokens") {
                Ok(ResponseEvent::MaxTokens)
            } else {
                Ok(ResponseEvent::TextDelta(String::new()))
            }
        }
        "error" => {
            Ok(ResponseEvent::Error(v["message"].as_str().unwrap_or("responses API error").to_string()))
        }
        _ => Ok(ResponseEvent::TextDelta(String::new())),
    }
}
