pub mod bitcoind;
mod wallet;

pub use self::wallet::Wallet;

use crate::quantity::Quantity;

/// Fee rate put into `feePerWU` fields unless a scenario overrides it.
pub const DEFAULT_FEE_PER_WU: u64 = 10;

/// Upper bound on the fees a swap costs on bitcoin.
pub fn maximum_fee() -> Quantity {
    Quantity::from_sat(100_000)
}

/// Minted on top of the requested quantity so the actor can pay for the
/// funding transaction.
pub fn fee_allowance() -> ::bitcoin::Amount {
    ::bitcoin::Amount::from_sat(1_000_000)
}
