use std::ops::RangeInclusive;

use alloy_primitives::Address;
use serde::Deserialize;
use thiserror::Error;

use crate::types::VerifyRequest;

const LATITUDE_RANGE: RangeInclusive<f64> = -90.0..=90.0;
const LONGITUDE_RANGE: RangeInclusive<f64> = -180.0..=180.0;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ClaimError {
    #[error("Missing required parameters.")]
    Missing,
    #[error("Invalid wallet address.")]
    WalletAddress,
    #[error("Invalid coordinates.")]
    Coordinates,
    #[error("Invalid request body.")]
    Body,
}

/// Parses a `0x`-prefixed 20-byte address. Mixed case means the caller is
/// asserting an EIP-55 checksum, which must then hold.
pub fn parse_wallet_address(s: &str) -> Result<Address, ClaimError> {
    let digits = s.strip_prefix("0x").ok_or(ClaimError::WalletAddress)?;
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ClaimError::WalletAddress);
    }

    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    let parsed = if has_lower && has_upper {
        Address::parse_checksummed(s, None).ok()
    } else {
        s.parse::<Address>().ok()
    };
    parsed.ok_or(ClaimError::WalletAddress)
}

/// Coordinates arrive either as JSON numbers or as numeric text.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CoordinateInput {
    Number(f64),
    Text(String),
}

impl CoordinateInput {
    fn parse(&self, range: RangeInclusive<f64>) -> Result<f64, ClaimError> {
        let value = match self {
            CoordinateInput::Number(n) => *n,
            CoordinateInput::Text(s) => s.trim().parse::<f64>().map_err(|_| ClaimError::Coordinates)?,
        };
        if value.is_finite() && range.contains(&value) {
            Ok(value)
        } else {
            Err(ClaimError::Coordinates)
        }
    }
}

/// A validated check-in claim. Only ever built from a [`VerifyRequest`] that
/// passed every field check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationClaim {
    pub wallet_address: Address,
    /// As sent. Negative ids are kept so they resolve as unknown destinations.
    pub destination_id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

impl TryFrom<VerifyRequest> for LocationClaim {
    type Error = ClaimError;

    fn try_from(req: VerifyRequest) -> Result<Self, Self::Error> {
        let (Some(wallet_address), Some(destination_id), Some(user_lat), Some(user_lon)) =
            (req.wallet_address, req.destination_id, req.user_lat, req.user_lon)
        else {
            return Err(ClaimError::Missing);
        };

        Ok(Self {
            wallet_address: parse_wallet_address(wallet_address.trim())?,
            destination_id,
            latitude: user_lat.parse(LATITUDE_RANGE)?,
            longitude: user_lon.parse(LONGITUDE_RANGE)?,
        })
    }
}
