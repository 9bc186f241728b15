//! ERC-20 transfer call data.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    /// Standard ERC-20 transfer.
    function transfer(address to, uint256 amount) returns (bool);
}

/// Call data moving `amount` token base units to `to`.
pub fn encode_transfer(to: Address, amount: U256) -> Bytes {
    Bytes::from(transferCall { to, amount }.abi_encode())
}

/// Recipient and amount from transfer call data, `None` if `data` is anything else.
pub fn decode_transfer(data: &[u8]) -> Option<(Address, U256)> {
    transferCall::abi_decode(data)
        .ok()
        .map(|call| (call.to, call.amount))
}
