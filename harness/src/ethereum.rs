pub mod geth;
mod wallet;

pub use self::wallet::Wallet;
pub use ethereum_types::{Address, H256, U256};

use crate::quantity::Quantity;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Upper bound on what a single transaction of ours may cost, in wei.
pub fn maximum_fee() -> Quantity {
    Quantity::from_wei(10_000_000_000_000_000)
}

/// Ether every minted account receives on top of the requested quantity to
/// pay for gas.
pub fn gas_allowance() -> Quantity {
    Quantity::ether(1)
}

const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Calldata for the ERC20 `transfer(address,uint256)` function.
pub fn transfer_call_data(to: Address, amount: U256) -> Vec<u8> {
    let mut data = TRANSFER_SELECTOR.to_vec();
    data.extend_from_slice(&encode_address(to));
    data.extend_from_slice(&encode_u256(amount));

    data
}

/// Calldata for the ERC20 `balanceOf(address)` function.
pub fn balance_of_call_data(account: Address) -> Vec<u8> {
    let mut data = BALANCE_OF_SELECTOR.to_vec();
    data.extend_from_slice(&encode_address(account));

    data
}

fn encode_address(address: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());

    word
}

fn encode_u256(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);

    word
}

/// Arbitrary bytes, hex encoded with a `0x` prefix on the wire.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes(bytes)
    }
}

impl Serialize for Bytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        let bytes = hex::decode(string.trim_start_matches("0x")).map_err(de::Error::custom)?;

        Ok(Bytes(bytes))
    }
}
