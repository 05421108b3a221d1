use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    error::{RelayError, protocol_violation},
    payment::types::ApiRequest,
    pipeline::{flows::FlowRecord, news::NewsSummaries},
};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that analyzes cryptocurrency smart money flows and related news to provide actionable insights.";

const INSTRUCTIONS: &str = "Provide a concise summary that:
1. Identifies which tokens smart money is accumulating or selling
2. Explains potential reasons based on the news articles
3. Highlights key trends or opportunities
4. Suggests how an investor should position their portfolio based on these insights";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

fn pretty(label: &str, value: &impl Serialize) -> Result<String, RelayError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| protocol_violation(format!("failed to render {}: {}", label, err)))
}

pub fn build_messages(
    news: &NewsSummaries,
    flows: &BTreeMap<String, FlowRecord>,
    search: &Value,
) -> Result<[PromptMessage; 2], RelayError> {
    let user = format!(
        "Analyze the following data:

GLORIA AI NEWS:
{}

SMART MONEY TOKEN FLOWS (from Nansen):
{}

RELATED NEWS & MARKET ANALYSIS (from Heurist):
{}

{}",
        pretty("news summaries", news)?,
        pretty("token flows", flows)?,
        pretty("search results", search)?,
        INSTRUCTIONS
    );

    Ok([
        PromptMessage {
            role: PromptRole::System,
            content: SYSTEM_PROMPT.to_string(),
        },
        PromptMessage {
            role: PromptRole::User,
            content: user,
        },
    ])
}

pub fn chat_request(url: &str, messages: &[PromptMessage], temperature: f64) -> ApiRequest {
    ApiRequest::post_json(
        url,
        json!({
            "messages": messages,
            "temperature": temperature,
        }),
    )
}

pub fn extract_response_text(body: &Value) -> String {
    match body.get("response") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}
