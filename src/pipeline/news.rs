use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{RelayError, protocol_violation},
    payment::types::ApiRequest,
};

pub const DEFAULT_SUMMARY: &str = "No summary available.";
pub const UNKNOWN_SOURCE: &str = "Unknown";
pub const MISSING_SIGNAL_KEY: &str = "null";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsSummary {
    pub sentiment: Option<Value>,
    pub summary: String,
    pub source: String,
}

pub type NewsSummaries = BTreeMap<String, NewsSummary>;

pub fn news_request(url: &str) -> ApiRequest {
    ApiRequest::get(url).with_header("Accept", "application/json")
}

fn topic_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn non_empty_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

pub fn parse_news(body: &Value) -> Result<NewsSummaries, RelayError> {
    let items = body
        .as_array()
        .ok_or_else(|| protocol_violation("news response is not a json array"))?;

    let mut summaries = NewsSummaries::new();
    for item in items {
        let Some(fields) = item.as_object() else {
            tracing::warn!(target: "pipeline", item = %item, "news_item_not_an_object");
            continue;
        };

        let topic = fields
            .get("signal")
            .and_then(topic_of)
            .unwrap_or_else(|| MISSING_SIGNAL_KEY.to_string());
        let sentiment = fields.get("sentiment").filter(|value| !value.is_null()).cloned();
        let summary = fields
            .get("short_context")
            .and_then(non_empty_text)
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string());
        let source = fields
            .get("sources")
            .and_then(Value::as_array)
            .and_then(|sources| sources.first())
            .and_then(non_empty_text)
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

        summaries.insert(
            topic,
            NewsSummary {
                sentiment,
                summary,
                source,
            },
        );
    }

    Ok(summaries)
}
