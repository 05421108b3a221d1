pub mod eip3009;
pub mod evm;
pub mod receipt;
pub mod transport;
pub mod types;
pub mod x402;
