use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    error::{RelayError, payment_required, protocol_violation},
    payment::{
        eip3009::{Eip712Domain, TransferAuthorization},
        evm::{Address, EvmSigner},
        receipt::decode_base64_json,
        types::{ApiResponse, PaymentProfile},
    },
};

pub const PAYMENT_REQUIRED_HEADER: &str = "payment-required";
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";
pub const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";

const EXACT_SCHEME: &str = "exact";
const DEFAULT_TOKEN_NAME: &str = "USD Coin";
const DEFAULT_TOKEN_VERSION: &str = "2";
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const VALID_AFTER_SKEW_SECONDS: u64 = 600;

pub fn chain_id(network: &str) -> Option<u64> {
    if let Some(id) = network.strip_prefix("eip155:") {
        return id.parse().ok();
    }
    match network {
        "base" => Some(8453),
        "base-sepolia" => Some(84532),
        "avalanche" => Some(43114),
        "avalanche-fuji" => Some(43113),
        "polygon" => Some(137),
        "polygon-amoy" => Some(80002),
        _ => None,
    }
}

fn networks_match(requested: &str, offered: &str) -> bool {
    if requested == offered {
        return true;
    }
    matches!((chain_id(requested), chain_id(offered)), (Some(a), Some(b)) if a == b)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    #[serde(alias = "amount")]
    pub max_amount_required: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub pay_to: String,
    #[serde(default)]
    pub max_timeout_seconds: Option<u64>,
    pub asset: String,
    #[serde(default)]
    pub extra: Option<Value>,
}

impl PaymentRequirements {
    pub fn amount(&self) -> Result<u128, RelayError> {
        self.max_amount_required.trim().parse().map_err(|_| {
            protocol_violation(format!(
                "payment amount '{}' is not an integer",
                self.max_amount_required
            ))
        })
    }

    fn extra_field(&self, key: &str) -> Option<&str> {
        self.extra
            .as_ref()
            .and_then(|extra| extra.get(key))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    #[serde(default = "default_version")]
    pub x402_version: u32,
    #[serde(default)]
    pub accepts: Vec<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub resource: Option<Value>,
}

fn default_version() -> u32 {
    1
}

impl PaymentChallenge {
    pub fn from_response(response: &ApiResponse) -> Result<Self, RelayError> {
        let header_value = response
            .headers
            .get(PAYMENT_REQUIRED_HEADER)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .filter(|value| !value.trim().is_empty());

        let document = match header_value {
            Some(encoded) => decode_base64_json(&encoded).map_err(|err| {
                protocol_violation(format!("unreadable payment-required header: {}", err))
            })?,
            None => response.json().map_err(|err| {
                protocol_violation(format!("402 response carries no challenge: {}", err.message))
            })?,
        };

        serde_json::from_value(document)
            .map_err(|err| protocol_violation(format!("malformed payment challenge: {}", err)))
    }

    /// Picks the first `exact` offer on the profile's network. That offer must fit the
    /// spend cap; later offers are not considered.
    pub fn select(&self, profile: &PaymentProfile) -> Result<(Value, PaymentRequirements), RelayError> {
        let mut offered_networks = Vec::new();

        for raw in &self.accepts {
            let Ok(requirement) = serde_json::from_value::<PaymentRequirements>(raw.clone())
            else {
                continue;
            };
            offered_networks.push(format!("{}/{}", requirement.scheme, requirement.network));
            if requirement.scheme != EXACT_SCHEME
                || !networks_match(&profile.network, &requirement.network)
            {
                continue;
            }

            let amount = requirement.amount()?;
            if amount > profile.max_amount_per_request {
                return Err(payment_required(format!(
                    "requested amount {} exceeds per-request cap {}",
                    amount, profile.max_amount_per_request
                )));
            }
            return Ok((raw.clone(), requirement));
        }

        let reason = self.error.as_deref().unwrap_or("no detail");
        Err(payment_required(format!(
            "no exact payment option on network {} (offered: [{}], server said: {})",
            profile.network,
            offered_networks.join(", "),
            reason
        )))
    }
}

#[derive(Debug, Clone)]
pub struct SignedPayment {
    pub header_name: &'static str,
    pub header_value: String,
    pub payload: Value,
}

pub fn sign_payment(
    signer: &EvmSigner,
    challenge: &PaymentChallenge,
    raw_requirement: &Value,
    requirement: &PaymentRequirements,
    now_unix: u64,
) -> Result<SignedPayment, RelayError> {
    let chain_id = chain_id(&requirement.network).ok_or_else(|| {
        payment_required(format!("unsupported network '{}'", requirement.network))
    })?;
    let domain = Eip712Domain {
        name: requirement
            .extra_field("name")
            .unwrap_or(DEFAULT_TOKEN_NAME)
            .to_string(),
        version: requirement
            .extra_field("version")
            .unwrap_or(DEFAULT_TOKEN_VERSION)
            .to_string(),
        chain_id,
        verifying_contract: Address::from_str(&requirement.asset)?,
    };
    let timeout = requirement
        .max_timeout_seconds
        .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
    let valid_before = now_unix.checked_add(timeout).ok_or_else(|| {
        protocol_violation(format!("maxTimeoutSeconds {} is out of range", timeout))
    })?;
    let authorization = TransferAuthorization {
        from: signer.address(),
        to: Address::from_str(&requirement.pay_to)?,
        value: requirement.amount()?,
        valid_after: now_unix.saturating_sub(VALID_AFTER_SKEW_SECONDS),
        valid_before,
        nonce: rand::random::<[u8; 32]>(),
    };

    let digest = authorization.signing_digest(&domain);
    let signature = signer.sign_digest(&digest)?;

    let exact_payload = json!({
        "signature": format!("0x{}", hex::encode(signature)),
        "authorization": {
            "from": authorization.from.to_string(),
            "to": authorization.to.to_string(),
            "value": authorization.value.to_string(),
            "validAfter": authorization.valid_after.to_string(),
            "validBefore": authorization.valid_before.to_string(),
            "nonce": format!("0x{}", hex::encode(authorization.nonce)),
        }
    });

    let (header_name, payload) = if challenge.x402_version >= 2 {
        let mut payload = json!({
            "x402Version": challenge.x402_version,
            "accepted": raw_requirement,
            "payload": exact_payload,
        });
        if let Some(resource) = &challenge.resource {
            payload["resource"] = resource.clone();
        }
        (PAYMENT_SIGNATURE_HEADER, payload)
    } else {
        (
            X_PAYMENT_HEADER,
            json!({
                "x402Version": challenge.x402_version,
                "scheme": requirement.scheme,
                "network": requirement.network,
                "payload": exact_payload,
            }),
        )
    };

    tracing::info!(
        target: "payment",
        network = %requirement.network,
        pay_to = %authorization.to,
        value = %authorization.value,
        x402_version = challenge.x402_version,
        "payment_authorization_signed"
    );

    Ok(SignedPayment {
        header_name,
        header_value: STANDARD.encode(payload.to_string()),
        payload,
    })
}
