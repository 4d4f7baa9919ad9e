use ethereum_types::U256;
use num::{BigUint, Num, ToPrimitive, Zero};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, ops::Add, str::FromStr};

/// An amount in the smallest unit of its asset (satoshi, wei, token base
/// unit).
///
/// cnd transmits quantities as decimal strings because wei amounts do not fit
/// into JSON numbers.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(BigUint);

impl Quantity {
    pub fn zero() -> Self {
        Quantity(BigUint::zero())
    }

    pub fn from_sat(sat: u64) -> Self {
        Quantity(BigUint::from(sat))
    }

    pub fn from_wei(wei: u64) -> Self {
        Quantity(BigUint::from(wei))
    }

    /// `ether` whole units expressed in wei.
    pub fn ether(ether: u64) -> Self {
        Quantity::from_units(ether, 18)
    }

    /// `units` whole units of an asset with `decimals` decimal places,
    /// expressed in its base unit.
    pub fn from_units(units: u64, decimals: u32) -> Self {
        Quantity(BigUint::from(units) * BigUint::from(10u64).pow(decimals))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn saturating_sub(&self, other: &Quantity) -> Quantity {
        if other.0 >= self.0 {
            Quantity::zero()
        } else {
            Quantity(&self.0 - &other.0)
        }
    }

    /// `percent` of this quantity, rounded down.
    pub fn scale(&self, percent: u32) -> Quantity {
        Quantity(&self.0 * BigUint::from(percent) / BigUint::from(100u32))
    }

    /// Multiplies by `numerator / denominator`, rounded down.
    pub fn ratio(&self, numerator: u32, denominator: u32) -> Quantity {
        Quantity(&self.0 * BigUint::from(numerator) / BigUint::from(denominator))
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    pub fn to_u256(&self) -> anyhow::Result<U256> {
        let bytes = self.0.to_bytes_be();
        if bytes.len() > 32 {
            anyhow::bail!("quantity {} does not fit into 256 bits", self);
        }

        Ok(U256::from_big_endian(&bytes))
    }

    /// Parses a `0x`-prefixed hex quantity as returned by Ethereum nodes.
    pub fn from_hex_str(hex: &str) -> anyhow::Result<Self> {
        let digits = hex.trim_start_matches("0x");
        if digits.is_empty() {
            return Ok(Quantity::zero());
        }

        let value = BigUint::from_str_radix(digits, 16)
            .map_err(|e| anyhow::anyhow!("invalid hex quantity {}: {}", hex, e))?;

        Ok(Quantity(value))
    }
}

impl From<U256> for Quantity {
    fn from(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);

        Quantity(BigUint::from_bytes_be(&bytes))
    }
}

impl From<::bitcoin::Amount> for Quantity {
    fn from(amount: ::bitcoin::Amount) -> Self {
        Quantity::from_sat(amount.to_sat())
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Quantity> for &'a Quantity {
    type Output = Quantity;

    fn add(self, rhs: &'a Quantity) -> Quantity {
        Quantity(&self.0 + &rhs.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Quantity {
    type Err = num::bigint::ParseBigIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigUint::from_str(s).map(Quantity)
    }
}

impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Quantity;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a decimal string or an unsigned integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Quantity, E>
            where
                E: de::Error,
            {
                Ok(Quantity(BigUint::from(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Quantity, E>
            where
                E: de::Error,
            {
                Quantity::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}
