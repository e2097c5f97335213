//! The attestation state machine.
//!
//! A request moves `Received -> AuthChecked -> ClaimValidated ->
//! DestinationResolved -> DistanceChecked -> Signed`, or stops at the first
//! gate it fails with a [`Rejection`]. Nothing is retried and nothing is
//! persisted, so resubmitting a claim re-runs the whole machine.

use std::{fmt, net::IpAddr, sync::Arc};

use alloy_primitives::{Address, Signature};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info};

#[cfg(feature = "ip-geofence")]
use crate::geoip::{self, NetworkScreen, ScreenError};
use crate::{
    claim::LocationClaim,
    distance::{classify, haversine_distance_meters, Proximity, GEOFENCE_RADIUS_METERS},
    error::Rejection,
    registry::{Destination, DestinationRegistry},
    signer::{attestation_digest, AttestationSigner},
    types::VerifyRequest,
};

/// Shared secret callers present in the `x-api-key` header.
pub struct ApiKey(Vec<u8>);

impl ApiKey {
    /// `None` for an empty secret.
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        (!secret.is_empty()).then(|| Self(secret.into_bytes()))
    }

    fn matches(&self, presented: &[u8]) -> bool {
        self.0.as_slice().ct_eq(presented).into()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Signature over the `(wallet, destination)` digest of an accepted claim.
#[derive(Debug, Clone, Copy)]
pub struct Attestation {
    pub signature: Signature,
}

impl Attestation {
    /// `0x` followed by the 65-byte `r || s || v` encoding, `v` in {27, 28}.
    pub fn signature_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signature.as_bytes()))
    }
}

pub struct Authority {
    api_key: ApiKey,
    registry: Arc<dyn DestinationRegistry>,
    signer: Arc<dyn AttestationSigner>,
    #[cfg(feature = "ip-geofence")]
    network_screen: Option<Arc<dyn NetworkScreen>>,
}

impl Authority {
    pub fn new(
        api_key: ApiKey,
        registry: Arc<dyn DestinationRegistry>,
        signer: Arc<dyn AttestationSigner>,
    ) -> Self {
        Self {
            api_key,
            registry,
            signer,
            #[cfg(feature = "ip-geofence")]
            network_screen: None,
        }
    }

    #[cfg(feature = "ip-geofence")]
    pub fn with_network_screen(mut self, screen: Arc<dyn NetworkScreen>) -> Self {
        self.network_screen = Some(screen);
        self
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    /// `Received -> AuthChecked`. A missing header compares as empty.
    pub fn authorize(&self, credential: Option<&[u8]>) -> Result<(), Rejection> {
        if self.api_key.matches(credential.unwrap_or_default()) {
            debug!("credential accepted");
            Ok(())
        } else {
            info!(header_present = credential.is_some(), "rejected: bad api key");
            Err(Rejection::Unauthorized)
        }
    }

    /// Runs every gate after authentication and signs the claim if it passes
    /// all of them.
    #[cfg_attr(not(feature = "ip-geofence"), allow(unused_variables))]
    pub async fn attest(
        &self,
        request: VerifyRequest,
        client_ip: Option<IpAddr>,
    ) -> Result<Attestation, Rejection> {
        let claim = LocationClaim::try_from(request).map_err(|e| {
            info!(reason = %e, "rejected: invalid claim");
            Rejection::from(e)
        })?;
        debug!(
            wallet = %claim.wallet_address,
            destination_id = claim.destination_id,
            "claim validated"
        );

        let destination = self.resolve(&claim)?;

        #[cfg(feature = "ip-geofence")]
        self.screen_network(&claim, &destination, client_ip).await?;

        self.check_distance(&claim, &destination)?;
        self.sign(&claim, &destination)
    }

    /// Ids outside the registry's key space, negative ones included, are
    /// unknown destinations rather than malformed claims.
    fn resolve(&self, claim: &LocationClaim) -> Result<Destination, Rejection> {
        let destination = u64::try_from(claim.destination_id)
            .ok()
            .and_then(|id| self.registry.lookup(id));
        let destination = destination.ok_or_else(|| {
            info!(
                destination_id = claim.destination_id,
                "rejected: unknown destination"
            );
            Rejection::NotFound
        })?;
        debug!(
            destination_id = destination.id,
            jurisdiction = destination.jurisdiction,
            "destination resolved"
        );
        Ok(destination)
    }

    #[cfg(feature = "ip-geofence")]
    async fn screen_network(
        &self,
        claim: &LocationClaim,
        destination: &Destination,
        client_ip: Option<IpAddr>,
    ) -> Result<(), Rejection> {
        let Some(screen) = &self.network_screen else {
            return Ok(());
        };
        let lookup = match client_ip {
            Some(ip) => screen.lookup(ip).await,
            None => Err(ScreenError::NoClientAddress),
        };
        let profile = lookup.map_err(|e| {
            error!(error = %e, wallet = %claim.wallet_address, "network screen unavailable");
            Rejection::NetworkLookup(e)
        })?;
        geoip::evaluate(&profile, destination.jurisdiction).map_err(|e| {
            info!(
                reason = %e,
                country = %profile.country_code,
                jurisdiction = destination.jurisdiction,
                "rejected: network screen"
            );
            Rejection::from(e)
        })?;
        debug!(country = %profile.country_code, "network screen passed");
        Ok(())
    }

    fn check_distance(
        &self,
        claim: &LocationClaim,
        destination: &Destination,
    ) -> Result<(), Rejection> {
        let distance_meters = haversine_distance_meters(
            claim.latitude,
            claim.longitude,
            destination.latitude,
            destination.longitude,
        );
        match classify(distance_meters, GEOFENCE_RADIUS_METERS) {
            Proximity::Within => {
                debug!(distance_meters, "distance checked");
                Ok(())
            }
            Proximity::Outside => {
                info!(
                    distance_meters,
                    destination_id = destination.id,
                    "rejected: outside geofence"
                );
                Err(Rejection::OutsideGeofence { distance_meters })
            }
        }
    }

    fn sign(
        &self,
        claim: &LocationClaim,
        destination: &Destination,
    ) -> Result<Attestation, Rejection> {
        let digest = attestation_digest(&claim.wallet_address, destination.id);
        let signature = self.signer.sign_digest(&digest).map_err(|e| {
            error!(error = %e, wallet = %claim.wallet_address, "failed to sign attestation");
            Rejection::Signing(e)
        })?;
        info!(
            wallet = %claim.wallet_address,
            destination_id = destination.id,
            "attestation issued"
        );
        Ok(Attestation { signature })
    }
}
