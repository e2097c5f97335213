use actix_web::{error, http::StatusCode, HttpResponse};
use thiserror::Error;

#[cfg(feature = "ip-geofence")]
use crate::geoip::{NetworkRejection, ScreenError};
use crate::{claim::ClaimError, signer::SignerError, types::ErrorResponse};

/// Terminal failure of a verification request. The `Display` text is what
/// the caller sees in the `error` field.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    BadRequest(#[from] ClaimError),
    #[error("Destination not found.")]
    NotFound,
    #[error("You are {} meters away.", whole_meters(.distance_meters))]
    OutsideGeofence { distance_meters: f64 },
    #[cfg(feature = "ip-geofence")]
    #[error(transparent)]
    Network(#[from] NetworkRejection),
    #[error("Internal server error.")]
    Signing(#[source] SignerError),
    #[cfg(feature = "ip-geofence")]
    #[error("Internal server error.")]
    NetworkLookup(#[source] ScreenError),
}

fn whole_meters(distance_meters: &f64) -> u64 {
    distance_meters.round() as u64
}

impl error::ResponseError for Rejection {
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Rejection::Unauthorized => StatusCode::UNAUTHORIZED,
            Rejection::BadRequest(_) => StatusCode::BAD_REQUEST,
            Rejection::NotFound => StatusCode::NOT_FOUND,
            Rejection::OutsideGeofence { .. } => StatusCode::FORBIDDEN,
            #[cfg(feature = "ip-geofence")]
            Rejection::Network(_) => StatusCode::FORBIDDEN,
            Rejection::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            #[cfg(feature = "ip-geofence")]
            Rejection::NetworkLookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
