use std::fmt;

use alloy_primitives::{keccak256, Address, Signature, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("private key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("private key must be 32 bytes, got {0}")]
    Length(usize),
    #[error("private key is not a valid secp256k1 scalar")]
    Scalar,
}

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("failed to sign attestation digest: {0}")]
    Signing(String),
}

/// Produces Ethereum-recoverable signatures over attestation digests.
pub trait AttestationSigner: Send + Sync {
    /// The address the on-chain consumer recovers signatures to.
    fn address(&self) -> Address;

    /// Signs `digest` as an EIP-191 personal message.
    fn sign_digest(&self, digest: &B256) -> Result<Signature, SignerError>;
}

/// `keccak256(abi.encodePacked(address wallet, uint256 destinationId))`
pub fn attestation_digest(wallet: &Address, destination_id: u64) -> B256 {
    keccak256((*wallet, U256::from(destination_id)).abi_encode_packed())
}

/// The service's secp256k1 key. Loaded once at startup and shared read-only
/// by every request.
pub struct SigningIdentity {
    signer: PrivateKeySigner,
}

impl SigningIdentity {
    pub fn from_hex(secret: &str) -> Result<Self, KeyError> {
        let secret = secret.trim();
        let secret = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes = hex::decode(secret)?;
        if bytes.len() != 32 {
            return Err(KeyError::Length(bytes.len()));
        }
        let signer = PrivateKeySigner::from_slice(&bytes).map_err(|_| KeyError::Scalar)?;
        Ok(Self { signer })
    }

    pub fn generate() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    /// Hex encoding of the secret scalar. Only for handing a freshly
    /// generated key to the operator.
    pub fn secret_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signer.credential().to_bytes()))
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("address", &self.signer.address())
            .finish_non_exhaustive()
    }
}

impl AttestationSigner for SigningIdentity {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn sign_digest(&self, digest: &B256) -> Result<Signature, SignerError> {
        self.signer
            .sign_message_sync(digest.as_slice())
            .map_err(|e| SignerError::Signing(e.to_string()))
    }
}

/// Signer that always fails, for exercising the internal-error path.
#[cfg(test)]
pub struct UnavailableSigner;

#[cfg(test)]
impl AttestationSigner for UnavailableSigner {
    fn address(&self) -> Address {
        Address::ZERO
    }

    fn sign_digest(&self, _digest: &B256) -> Result<Signature, SignerError> {
        Err(SignerError::Signing("signer unavailable".into()))
    }
}

/// Recovers the signer of a 65-byte `r || s || v` signature the way an EVM
/// `ECDSA.recover(toEthSignedMessageHash(digest), sig)` would.
#[cfg(test)]
pub fn recover_address(digest: &B256, signature_65: &[u8]) -> Option<Address> {
    Signature::try_from(signature_65)
        .ok()?
        .recover_address_from_msg(digest.as_slice())
        .ok()
}
