use serde::{Deserialize, Serialize};

use crate::error::VeilError;
use crate::primitives::Point;

/// Tag for addresses carrying a packed Baby Jubjub public key.
pub const EIG_PREFIX: &str = "eig:";
/// Tag for Ethereum addresses used at the ledger boundary.
pub const ETH_PREFIX: &str = "eth:";

/// A protocol address: `eig:` followed by the hex of a compressed Baby
/// Jubjub public key. Construction always validates the tag, the hex and
/// that the key is a point on the curve.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EigenAddress(String);

impl EigenAddress {
    pub fn from_point(point: &Point) -> Self {
        EigenAddress(format!("{EIG_PREFIX}{}", hex::encode(point.compress())))
    }

    pub fn parse(s: &str) -> Result<Self, VeilError> {
        let address = EigenAddress(s.to_string());
        address.point()?;
        Ok(address)
    }

    /// Unpacks the curve point behind the address.
    pub fn point(&self) -> Result<Point, VeilError> {
        let body = self
            .0
            .strip_prefix(EIG_PREFIX)
            .ok_or_else(|| VeilError::Validation(format!("missing {EIG_PREFIX} prefix: {}", self.0)))?;
        let bytes = hex::decode(body)
            .map_err(|e| VeilError::Validation(format!("bad address hex: {e}")))?;
        let packed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VeilError::Validation("address must pack 32 bytes".to_string()))?;
        Point::decompress(&packed)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EigenAddress {
    type Error = VeilError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        EigenAddress::parse(&s)
    }
}

impl From<EigenAddress> for String {
    fn from(a: EigenAddress) -> String {
        a.0
    }
}

impl std::fmt::Display for EigenAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An Ethereum address in `eth:` tagged-hex form, only ever handed to the
/// settlement contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EthAddress(String);

impl EthAddress {
    pub fn parse(s: &str) -> Result<Self, VeilError> {
        let body = s
            .strip_prefix(ETH_PREFIX)
            .or_else(|| s.strip_prefix("0x"))
            .ok_or_else(|| VeilError::Validation(format!("missing {ETH_PREFIX} prefix: {s}")))?;
        let bytes = hex::decode(body)
            .map_err(|e| VeilError::Validation(format!("bad address hex: {e}")))?;
        if bytes.len() != 20 {
            return Err(VeilError::Validation("ethereum address must be 20 bytes".to_string()));
        }
        Ok(EthAddress(format!("{ETH_PREFIX}{}", hex::encode(bytes))))
    }

    /// The raw 20 bytes.
    pub fn bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        let body = self.0.strip_prefix(ETH_PREFIX).unwrap();
        out.copy_from_slice(&hex::decode(body).unwrap());
        out
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EthAddress {
    type Error = VeilError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        EthAddress::parse(&s)
    }
}

impl From<EthAddress> for String {
    fn from(a: EthAddress) -> String {
        a.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::primitives::SigningKey;

    #[test]
    fn test_eigen_address_round_trip() {
        let key = SigningKey::from_seed([1u8; 32]);
        let address = EigenAddress::from_point(&key.public());
        assert!(address.as_str().starts_with(EIG_PREFIX));
        let parsed = EigenAddress::parse(address.as_str()).unwrap();
        assert_eq!(parsed.point().unwrap(), key.public());
    }

    #[test]
    fn test_eigen_address_rejects_untagged() {
        assert!(EigenAddress::parse("deadbeef").is_err());
    }

    #[test]
    fn test_eth_address_normalizes_0x() {
        let a = EthAddress::parse("0x00000000000000000000000000000000000000ff").unwrap();
        assert!(a.as_str().starts_with(ETH_PREFIX));
        assert_eq!(a.bytes()[19], 0xff);
    }

    #[test]
    fn test_eth_address_rejects_short() {
        assert!(EthAddress::parse("eth:ff00").is_err());
    }
}
