use serde::{Deserialize, Serialize};

use crate::{authority::Authority, claim::CoordinateInput};

pub struct AppState {
    pub authority: Authority,
    /// Take the client address from `Forwarded`/`X-Forwarded-For` instead of
    /// the socket peer. Only safe behind a proxy that overwrites them.
    pub trust_forwarded_headers: bool,
}

/// Body of `POST /api/verify`. Every field is optional here so that a
/// missing field surfaces as a domain rejection rather than a decode error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub wallet_address: Option<String>,
    pub destination_id: Option<i64>,
    pub user_lat: Option<CoordinateInput>,
    pub user_lon: Option<CoordinateInput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
