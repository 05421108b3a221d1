use std::{collections::BTreeSet, sync::Arc};

use serde_json::json;

use insight_relay::{
    payment::types::PaymentMode,
    pipeline::{PipelineState, Stage, flows::flow_query, progress::PipelineEvent},
};

use crate::support::{
    CHAT_URL, FLOWS_URL, NEWS_URL, RecordingSink, SEARCH_URL, ScriptedTransport, ok_json,
    paid_json, pipeline, quiet_pipeline,
};

fn script_happy_path(transport: &ScriptedTransport) {
    transport
        .push(paid_json(
            json!([{
                "signal": "BTC",
                "sentiment": "bullish",
                "short_context": "ETF inflows",
                "sources": ["X"]
            }]),
            "0xclient1",
            &json!({"success": true, "transaction": "0xnews", "network": "base"}),
        ))
        .push(ok_json(json!({"data": [
            {"token_symbol": "ETH", "net_flow_30d_usd": 1000000.5, "token_sectors": ["DeFi"]},
            {"token_symbol": "ONDO", "net_flow_30d_usd": -25000.0, "token_sectors": ["RWA", "DeFi"]}
        ]})))
        .push(ok_json(json!({"result": {"data": {"articles": [{"title": "ETH staking"}]}}})))
        .push(paid_json(
            json!({"response": "Smart money is accumulating ETH."}),
            "0xclient4",
            &json!({"success": true, "transaction": "0xchat", "network": "base"}),
        ));
}

#[tokio::test]
async fn given_all_endpoints_succeed_when_pipeline_runs_then_report_threads_every_stage() {
    let transport = Arc::new(ScriptedTransport::default());
    script_happy_path(&transport);
    let sink = Arc::new(RecordingSink::default());

    let report = pipeline(transport.clone(), sink.clone())
        .run()
        .await
        .expect("pipeline should succeed");

    assert_eq!(report.state, PipelineState::Reported);
    assert_eq!(
        serde_json::to_value(&report.news).expect("news serializes"),
        json!({"BTC": {"sentiment": "bullish", "summary": "ETF inflows", "source": "X"}})
    );
    assert_eq!(report.flows.symbols, vec!["ETH".to_string(), "ONDO".to_string()]);
    assert_eq!(
        report.flows.sectors,
        BTreeSet::from(["DeFi".to_string(), "RWA".to_string()])
    );
    assert_eq!(report.search, json!({"articles": [{"title": "ETH staking"}]}));
    assert_eq!(report.analysis, "Smart money is accumulating ETH.");

    let settled = report
        .receipts
        .iter()
        .filter_map(|(stage, receipt)| receipt.settlement_transaction().map(|tx| (*stage, tx)))
        .collect::<Vec<_>>();
    assert_eq!(settled, vec![(Stage::News, "0xnews"), (Stage::Insight, "0xchat")]);
}

#[tokio::test]
async fn given_pipeline_runs_when_requests_are_recorded_then_contracts_and_modes_match() {
    let transport = Arc::new(ScriptedTransport::default());
    script_happy_path(&transport);

    quiet_pipeline(transport.clone())
        .run()
        .await
        .expect("pipeline should succeed");

    let calls = transport.calls();
    assert_eq!(calls.len(), 4);

    assert_eq!(calls[0].method, "GET");
    assert_eq!(calls[0].url, NEWS_URL);
    assert!(
        calls[0]
            .headers
            .contains(&("Accept".to_string(), "application/json".to_string()))
    );
    assert_eq!(calls[0].json, None);

    assert_eq!(calls[1].method, "POST");
    assert_eq!(calls[1].url, FLOWS_URL);
    assert_eq!(calls[1].json, Some(flow_query()));

    assert_eq!(calls[2].url, SEARCH_URL);
    let search_body = calls[2].json.clone().expect("search body");
    assert_eq!(
        search_body["search_term"],
        json!(
            "Recent cryptocurrency news and market analysis for tokens: ETH, ONDO. Focus on DeFi, RWA sectors."
        )
    );
    assert_eq!(search_body["limit"], json!(5));
    assert_eq!(search_body["time_filter"], json!("past_month"));

    assert_eq!(calls[3].url, CHAT_URL);
    let chat_body = calls[3].json.clone().expect("chat body");
    assert_eq!(chat_body["temperature"], json!(0.7));
    assert_eq!(chat_body["messages"].as_array().map(Vec::len), Some(2));
    let user_prompt = chat_body["messages"][1]["content"]
        .as_str()
        .expect("user prompt is text");
    assert!(user_prompt.contains("\"ONDO\""));
    assert!(user_prompt.contains("ETH staking"));

    for call in &calls {
        assert!(
            call.headers.iter().any(|(name, _)| name == "Accept")
                || call.headers
                    .contains(&("Content-Type".to_string(), "application/json".to_string())),
            "every call declares its json content negotiation: {call:?}"
        );
    }

    let modes = calls.iter().map(|call| call.mode).collect::<Vec<_>>();
    assert_eq!(
        modes,
        vec![
            PaymentMode::Relay,
            PaymentMode::Relay,
            PaymentMode::Relay,
            PaymentMode::Direct
        ]
    );
}

#[tokio::test]
async fn given_pipeline_runs_when_progress_is_recorded_then_stages_announce_in_order() {
    let transport = Arc::new(ScriptedTransport::default());
    script_happy_path(&transport);
    let sink = Arc::new(RecordingSink::default());

    pipeline(transport, sink.clone())
        .run()
        .await
        .expect("pipeline should succeed");

    let events = sink.events();
    let started = events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::StageStarted { stage } => Some(*stage),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(started, Stage::ALL.to_vec());

    let payments = events
        .iter()
        .filter(|event| matches!(event, PipelineEvent::PaymentObserved { .. }))
        .count();
    assert_eq!(payments, 2, "only responses carrying payment headers are announced");

    match events.last() {
        Some(PipelineEvent::Completed { analysis, receipts }) => {
            assert_eq!(analysis, "Smart money is accumulating ETH.");
            assert_eq!(receipts.len(), 4);
        }
        other => panic!("last event should be Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn given_search_response_without_result_when_pipeline_runs_then_empty_payload_is_used() {
    let transport = Arc::new(ScriptedTransport::default());
    transport
        .push(ok_json(json!([])))
        .push(ok_json(json!({"data": []})))
        .push(ok_json(json!({"status": "degraded"})))
        .push(ok_json(json!({})));

    let report = quiet_pipeline(transport.clone())
        .run()
        .await
        .expect("pipeline should succeed");

    assert_eq!(report.search, json!({}));
    assert_eq!(report.analysis, "");
    assert!(report.news.is_empty());
    assert!(report.flows.records.is_empty());
}
