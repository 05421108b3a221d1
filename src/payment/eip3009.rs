use crate::payment::evm::{Address, keccak256};

const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const TRANSFER_WITH_AUTHORIZATION_TYPE: &str = "TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferAuthorization {
    pub from: Address,
    pub to: Address,
    pub value: u128,
    pub valid_after: u64,
    pub valid_before: u64,
    pub nonce: [u8; 32],
}

pub fn domain_type_hash() -> [u8; 32] {
    keccak256(DOMAIN_TYPE.as_bytes())
}

pub fn transfer_type_hash() -> [u8; 32] {
    keccak256(TRANSFER_WITH_AUTHORIZATION_TYPE.as_bytes())
}

pub fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

impl Eip712Domain {
    pub fn separator(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(32 * 5);
        encoded.extend_from_slice(&domain_type_hash());
        encoded.extend_from_slice(&keccak256(self.name.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.version.as_bytes()));
        encoded.extend_from_slice(&uint_word(u128::from(self.chain_id)));
        encoded.extend_from_slice(&self.verifying_contract.to_word());
        keccak256(&encoded)
    }
}

impl TransferAuthorization {
    pub fn struct_hash(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(32 * 7);
        encoded.extend_from_slice(&transfer_type_hash());
        encoded.extend_from_slice(&self.from.to_word());
        encoded.extend_from_slice(&self.to.to_word());
        encoded.extend_from_slice(&uint_word(self.value));
        encoded.extend_from_slice(&uint_word(u128::from(self.valid_after)));
        encoded.extend_from_slice(&uint_word(u128::from(self.valid_before)));
        encoded.extend_from_slice(&self.nonce);
        keccak256(&encoded)
    }

    pub fn signing_digest(&self, domain: &Eip712Domain) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(2 + 64);
        encoded.extend_from_slice(&[0x19, 0x01]);
        encoded.extend_from_slice(&domain.separator());
        encoded.extend_from_slice(&self.struct_hash());
        keccak256(&encoded)
    }
}
