//! Best-effort network screening: rejects claims sent from a different
//! country than the destination's, or through a proxy or hosting provider.
//!
//! Only compiled with the `ip-geofence` feature, and only active when a
//! geolocation endpoint is configured.

use std::{net::IpAddr, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
const LOOKUP_FIELDS: &str = "status,message,countryCode,proxy,hosting";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub country_code: String,
    pub proxy: bool,
    pub hosting: bool,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NetworkRejection {
    #[error("VPN or proxy connections are not allowed.")]
    Anonymized,
    #[error("Your network location does not match the destination country.")]
    CountryMismatch,
}

#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("client address unavailable")]
    NoClientAddress,
    #[error("geolocation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geolocation lookup failed: {0}")]
    Lookup(String),
}

#[async_trait]
pub trait NetworkScreen: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Result<NetworkProfile, ScreenError>;
}

pub fn evaluate(profile: &NetworkProfile, jurisdiction: &str) -> Result<(), NetworkRejection> {
    if profile.proxy || profile.hosting {
        return Err(NetworkRejection::Anonymized);
    }
    if !profile.country_code.eq_ignore_ascii_case(jurisdiction) {
        return Err(NetworkRejection::CountryMismatch);
    }
    Ok(())
}

/// Client for an ip-api.com compatible JSON endpoint.
pub struct IpApiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    country_code: Option<String>,
    #[serde(default)]
    proxy: bool,
    #[serde(default)]
    hosting: bool,
}

impl TryFrom<IpApiResponse> for NetworkProfile {
    type Error = ScreenError;

    fn try_from(resp: IpApiResponse) -> Result<Self, Self::Error> {
        if resp.status != "success" {
            return Err(ScreenError::Lookup(
                resp.message.unwrap_or_else(|| resp.status.clone()),
            ));
        }
        let country_code = resp
            .country_code
            .ok_or_else(|| ScreenError::Lookup("response has no country code".into()))?;
        Ok(NetworkProfile {
            country_code,
            proxy: resp.proxy,
            hosting: resp.hosting,
        })
    }
}

impl IpApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ScreenError> {
        let client = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NetworkScreen for IpApiClient {
    async fn lookup(&self, ip: IpAddr) -> Result<NetworkProfile, ScreenError> {
        let resp: IpApiResponse = self
            .client
            .get(format!("{}/{}", self.base_url, ip))
            .query(&[("fields", LOOKUP_FIELDS)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        resp.try_into()
    }
}
