use std::collections::BTreeSet;

use serde_json::{Value, json};

use crate::payment::types::ApiRequest;

pub const SEARCH_LIMIT: u32 = 5;
pub const SEARCH_TIME_FILTER: &str = "past_month";
const PREVIEW_CHARS: usize = 100;

pub fn build_search_term(symbols: &[String], sectors: &BTreeSet<String>) -> String {
    format!(
        "Recent cryptocurrency news and market analysis for tokens: {}. Focus on {} sectors.",
        symbols.join(", "),
        sectors.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    )
}

pub fn preview_term(term: &str) -> String {
    format!("{}...", term.chars().take(PREVIEW_CHARS).collect::<String>())
}

pub fn search_request(url: &str, search_term: &str) -> ApiRequest {
    ApiRequest::post_json(
        url,
        json!({
            "search_term": search_term,
            "limit": SEARCH_LIMIT,
            "time_filter": SEARCH_TIME_FILTER,
        }),
    )
}

pub fn extract_search_payload(body: &Value) -> Value {
    body.get("result")
        .and_then(|result| result.get("data"))
        .cloned()
        .unwrap_or_else(|| json!({}))
}
