use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value, json};

use crate::{
    error::{RelayError, protocol_violation},
    payment::types::ApiRequest,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub net_flow_30d_usd: Number,
    pub token_sectors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlowRow {
    pub token_symbol: String,
    pub net_flow_30d_usd: Number,
    pub token_sectors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FlowResponse {
    #[serde(default)]
    data: Option<Vec<FlowRow>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowSnapshot {
    pub records: BTreeMap<String, FlowRecord>,
    // Every symbol in response order, duplicates included.
    pub symbols: Vec<String>,
    pub sectors: BTreeSet<String>,
    pub rows: Vec<FlowRow>,
}

pub fn flow_query() -> Value {
    json!({
        "chains": ["ethereum", "solana"],
        "filters": {
            "exclude_smart_money_labels": ["30D Smart Trader"],
            "include_native_tokens": false,
            "include_smart_money_labels": ["Fund", "Smart Trader"],
            "include_stablecoins": true
        },
        "pagination": {
            "page": 1,
            "per_page": 10
        },
        "order_by": [
            {
                "field": "net_flow_30d_usd",
                "direction": "DESC"
            }
        ]
    })
}

pub fn flows_request(url: &str) -> ApiRequest {
    ApiRequest::post_json(url, flow_query())
}

pub fn parse_flows(body: Value) -> Result<FlowSnapshot, RelayError> {
    let response: FlowResponse = serde_json::from_value(body)
        .map_err(|err| protocol_violation(format!("malformed netflow response: {}", err)))?;

    let mut snapshot = FlowSnapshot::default();
    for row in response.data.unwrap_or_default() {
        snapshot.symbols.push(row.token_symbol.clone());
        snapshot.sectors.extend(row.token_sectors.iter().cloned());
        snapshot.records.insert(
            row.token_symbol.clone(),
            FlowRecord {
                net_flow_30d_usd: row.net_flow_30d_usd.clone(),
                token_sectors: row.token_sectors.clone(),
            },
        );
        snapshot.rows.push(row);
    }

    Ok(snapshot)
}

pub fn format_usd(amount: &Number) -> String {
    let value = amount.as_f64().unwrap_or_default();
    let fixed = format!("{:.2}", value.abs());
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (idx, digit) in integer.chars().enumerate() {
        if idx > 0 && (integer.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, fraction)
}
