use crate::error::{ChainError, Result};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// SECP256k1 private key.
#[derive(Clone, Debug)]
pub struct PrivateKey(pub SigningKey);

impl PrivateKey {
    pub fn new_key() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(*self.0.verifying_key())
    }

    /// Sign a string. The message is hashed with SHA-256 before the
    /// ECDSA operation, so signing a txid signs SHA-256(txid).
    pub fn sign(&self, data: &str) -> Signature {
        Signature(self.0.sign(data.as_bytes()))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded)
            .map_err(|_| ChainError::malformed("private key is not valid hex"))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| ChainError::malformed("invalid private key bytes"))?;
        Ok(PrivateKey(key))
    }
}

/// SECP256k1 public key. Its compressed SEC1 hex encoding doubles as
/// the wallet address on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(pub VerifyingKey);

impl PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_encoded_point(true).as_bytes())
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded)
            .map_err(|_| ChainError::malformed("public key is not valid hex"))?;
        let key = VerifyingKey::from_sec1_bytes(&bytes)
            .map_err(|_| ChainError::malformed("invalid public key bytes"))?;
        Ok(PublicKey(key))
    }
}

/// ECDSA signature over the SHA-256 digest of a string message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(pub EcdsaSignature);

impl Signature {
    pub fn verify(&self, data: &str, public_key: &PublicKey) -> bool {
        public_key.0.verify(data.as_bytes(), &self.0).is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded)
            .map_err(|_| ChainError::malformed("signature is not valid hex"))?;
        let signature = EcdsaSignature::from_slice(&bytes)
            .map_err(|_| ChainError::malformed("invalid signature bytes"))?;
        Ok(Signature(signature))
    }
}

/// A key pair plus the per-wallet transaction counter.
///
/// The nonce increments once per signed transaction and is embedded in
/// the signed payload, so replaying an old transaction produces a
/// different txid than a fresh one.
#[derive(Clone, Debug)]
pub struct Wallet {
    private_key: PrivateKey,
    nonce: u64,
}

/// Serialized wallet form used by the on-disk wallet files.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StoredWallet {
    pub private_key: String,
    pub nonce: u64,
}

impl Wallet {
    pub fn generate() -> Self {
        Wallet {
            private_key: PrivateKey::new_key(),
            nonce: 0,
        }
    }

    /// The wallet address: hex of the compressed public key.
    pub fn address(&self) -> String {
        self.private_key.public_key().to_hex()
    }

    /// Sign a string message, returning the hex signature.
    pub fn sign(&self, data: &str) -> String {
        self.private_key.sign(data).to_hex()
    }

    /// Verify a hex signature against an address. Malformed hex in the
    /// signature or the address counts as a failed verification rather
    /// than an error, matching wire-level tolerance.
    pub fn verify(data: &str, signature_hex: &str, address: &str) -> bool {
        let Ok(public_key) = PublicKey::from_hex(address) else {
            return false;
        };
        let Ok(signature) = Signature::from_hex(signature_hex) else {
            return false;
        };
        signature.verify(data, &public_key)
    }

    pub fn current_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn increment_nonce(&mut self) -> u64 {
        self.nonce += 1;
        self.nonce
    }

    pub fn to_stored(&self) -> StoredWallet {
        StoredWallet {
            private_key: self.private_key.to_hex(),
            nonce: self.nonce,
        }
    }

    pub fn from_stored(stored: &StoredWallet) -> Result<Self> {
        Ok(Wallet {
            private_key: PrivateKey::from_hex(&stored.private_key)?,
            nonce: stored.nonce,
        })
    }
}

#[cfg(test)]
mod tests;
