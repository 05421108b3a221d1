use std::{fmt, str::FromStr};

use k256::{
    ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
};
use sha3::{Digest, Keccak256};

use crate::error::{RelayError, configuration_error, signing_error};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.as_affine().to_encoded_point(false);
        // Uncompressed SEC1 points carry a 0x04 tag byte before X || Y.
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[12..]);
        Self(bytes)
    }

    /// EIP-55 mixed-case rendering.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (idx, ch) in lower.chars().enumerate() {
            let nibble = (hash[idx / 2] >> (if idx % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        out
    }

    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl FromStr for Address {
    type Err = RelayError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(hex_part)
            .map_err(|err| signing_error(format!("invalid address '{}': {}", raw, err)))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| signing_error(format!("address '{}' must be 20 bytes", raw)))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

pub struct EvmSigner {
    key: SigningKey,
    address: Address,
}

impl EvmSigner {
    pub fn from_hex(private_key: &str) -> Result<Self, RelayError> {
        let trimmed = private_key.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(hex_part)
            .map_err(|_| configuration_error("private key must be hex encoded"))?;
        if bytes.len() != 32 {
            return Err(configuration_error(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| configuration_error("private key is not a valid secp256k1 scalar"))?;
        let address = Address::from_verifying_key(key.verifying_key());

        Ok(Self { key, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; 65], RelayError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|err| signing_error(format!("failed to sign digest: {}", err)))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = 27 + recovery_id.to_byte();
        Ok(out)
    }
}

impl fmt::Debug for EvmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

pub fn recover_address(digest: &[u8; 32], signature: &[u8; 65]) -> Result<Address, RelayError> {
    let parsed = Signature::from_slice(&signature[..64])
        .map_err(|err| signing_error(format!("malformed signature: {}", err)))?;
    let recovery_id = RecoveryId::from_byte(signature[64].wrapping_sub(27))
        .ok_or_else(|| signing_error("signature recovery byte out of range"))?;
    let key = VerifyingKey::recover_from_prehash(digest, &parsed, recovery_id)
        .map_err(|err| signing_error(format!("signature recovery failed: {}", err)))?;
    Ok(Address::from_verifying_key(&key))
}
