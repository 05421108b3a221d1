use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header_exists, method, path},
};

use insight_relay::{
    error::RelayErrorKind,
    payment::{
        eip3009::{Eip712Domain, TransferAuthorization},
        evm::{Address, recover_address},
        receipt::extract_payment_info,
        transport::PaymentTransport,
        types::{ApiRequest, PaymentMode},
    },
};

use crate::support::{PAY_TO, USDC_BASE, challenge, offer, profile, signer, transport};

fn decode_header(value: &[u8]) -> Value {
    let bytes = STANDARD.decode(value).expect("payment header is base64");
    serde_json::from_slice(&bytes).expect("payment header is json")
}

fn parse_u64(value: &Value) -> u64 {
    value
        .as_str()
        .and_then(|raw| raw.parse().ok())
        .expect("numeric string")
}

fn chat_request(server: &MockServer) -> ApiRequest {
    ApiRequest::post_json(
        format!("{}/llm/chat", server.uri()),
        json!({"messages": [], "temperature": 0.7}),
    )
}

#[tokio::test]
async fn given_402_challenge_when_sending_direct_then_signed_retry_is_accepted() {
    let server = MockServer::start().await;
    let settlement = json!({"success": true, "transaction": "0xsettled", "network": "base"});
    Mock::given(method("POST"))
        .and(path("/llm/chat"))
        .and(header_exists("x-payment"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-payment-response", STANDARD.encode(settlement.to_string()))
                .set_body_json(json!({"response": "Accumulate ETH."})),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/llm/chat"))
        .respond_with(
            ResponseTemplate::new(402).set_body_json(challenge(vec![offer("base", "10000")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let signer = signer();
    let response = transport(signer.clone())
        .send(&profile(PaymentMode::Direct, "http://unused.test"), chat_request(&server))
        .await
        .expect("paid request succeeds");

    assert_eq!(response.status, 200);
    assert_eq!(
        response.json().expect("json body"),
        json!({"response": "Accumulate ETH."})
    );
    assert_eq!(
        extract_payment_info(&response.headers).settlement_transaction(),
        Some("0xsettled")
    );

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 2);
    assert!(requests[0].headers.get("x-payment").is_none());
    let retried_body: Value = serde_json::from_slice(&requests[1].body).expect("json body");
    assert_eq!(retried_body["temperature"], json!(0.7));

    let payment = decode_header(
        requests[1]
            .headers
            .get("x-payment")
            .expect("retry carries X-PAYMENT")
            .as_bytes(),
    );
    assert_eq!(payment["x402Version"], json!(1));
    assert_eq!(payment["scheme"], json!("exact"));
    assert_eq!(payment["network"], json!("base"));

    let authorization = &payment["payload"]["authorization"];
    assert_eq!(authorization["from"], json!(signer.address().to_string()));
    assert_eq!(authorization["to"], json!(PAY_TO));
    assert_eq!(authorization["value"], json!("10000"));
    let valid_after = parse_u64(&authorization["validAfter"]);
    let valid_before = parse_u64(&authorization["validBefore"]);
    assert_eq!(valid_before - valid_after, 600 + 120);

    let nonce_hex = authorization["nonce"]
        .as_str()
        .and_then(|raw| raw.strip_prefix("0x"))
        .expect("hex nonce");
    let nonce: [u8; 32] = hex::decode(nonce_hex)
        .expect("nonce hex")
        .try_into()
        .expect("32-byte nonce");
    let signature: [u8; 65] = payment["payload"]["signature"]
        .as_str()
        .and_then(|raw| raw.strip_prefix("0x"))
        .map(|raw| hex::decode(raw).expect("signature hex"))
        .expect("hex signature")
        .try_into()
        .expect("65-byte signature");

    let domain = Eip712Domain {
        name: "USD Coin".to_string(),
        version: "2".to_string(),
        chain_id: 8453,
        verifying_contract: Address::from_str(USDC_BASE).expect("asset address"),
    };
    let digest = TransferAuthorization {
        from: signer.address(),
        to: Address::from_str(PAY_TO).expect("pay-to address"),
        value: 10_000,
        valid_after,
        valid_before,
        nonce,
    }
    .signing_digest(&domain);
    assert_eq!(
        recover_address(&digest, &signature).expect("signature recovers"),
        signer.address()
    );
}

#[tokio::test]
async fn given_v2_header_challenge_when_sending_direct_then_payment_signature_header_is_used() {
    let server = MockServer::start().await;
    let mut accepted = offer("eip155:8453", "2500");
    accepted["amount"] = accepted["maxAmountRequired"].take();
    accepted
        .as_object_mut()
        .expect("offer is an object")
        .remove("maxAmountRequired");
    let required = json!({
        "x402Version": 2,
        "accepts": [accepted.clone()],
        "resource": {"url": "https://api.test/chat"}
    });

    Mock::given(method("POST"))
        .and(path("/llm/chat"))
        .and(header_exists("payment-signature"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "ok"})))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/llm/chat"))
        .respond_with(
            ResponseTemplate::new(402)
                .insert_header("payment-required", STANDARD.encode(required.to_string())),
        )
        .mount(&server)
        .await;

    let response = transport(signer())
        .send(&profile(PaymentMode::Direct, "http://unused.test"), chat_request(&server))
        .await
        .expect("paid request succeeds");
    assert_eq!(response.status, 200);

    let requests = server.received_requests().await.expect("recording enabled");
    let payment = decode_header(
        requests[1]
            .headers
            .get("payment-signature")
            .expect("retry carries PAYMENT-SIGNATURE")
            .as_bytes(),
    );
    assert_eq!(payment["x402Version"], json!(2));
    assert_eq!(payment["accepted"], accepted);
    assert_eq!(payment["resource"], json!({"url": "https://api.test/chat"}));
    assert_eq!(payment["payload"]["authorization"]["value"], json!("2500"));
}

#[tokio::test]
async fn given_amount_above_cap_when_sending_direct_then_no_payment_is_made() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm/chat"))
        .respond_with(
            ResponseTemplate::new(402).set_body_json(challenge(vec![offer("base", "5000000")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(signer())
        .send(&profile(PaymentMode::Direct, "http://unused.test"), chat_request(&server))
        .await
        .expect_err("amount above the cap must be refused");

    assert_eq!(err.kind, RelayErrorKind::PaymentRequired);
    assert_eq!(err.http_status, Some(402));
    assert!(err.message.contains("exceeds per-request cap 1000000"));
}

#[tokio::test]
async fn given_offer_on_other_network_when_sending_direct_then_payment_required_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm/chat"))
        .respond_with(
            ResponseTemplate::new(402)
                .set_body_json(challenge(vec![offer("base-sepolia", "10000")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(signer())
        .send(&profile(PaymentMode::Direct, "http://unused.test"), chat_request(&server))
        .await
        .expect_err("no offer on base");

    assert_eq!(err.kind, RelayErrorKind::PaymentRequired);
    assert!(err.message.contains("exact/base-sepolia"));
}

#[tokio::test]
async fn given_non_402_failure_when_sending_direct_then_response_is_returned_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport(signer())
        .send(&profile(PaymentMode::Direct, "http://unused.test"), chat_request(&server))
        .await
        .expect("status errors are left to the caller");

    assert_eq!(response.status, 503);
    assert_eq!(response.body, b"overloaded".to_vec());
}
