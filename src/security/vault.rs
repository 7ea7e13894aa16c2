//! Credential vault: key generation, lookup hashing and AES-256-GCM sealing
//! of webhook secrets.
//!
//! The secret has to come back in plaintext for HMAC verification, so it is
//! encrypted rather than hashed. The public identifier is only ever hashed.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::models::credential::{CredentialSecret, SealedSecret};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const PUBLIC_ID_BYTES: usize = 24;
const SECRET_BYTES: usize = 32;
const PUBLIC_ID_PREFIX: &str = "whk_";
const DISPLAY_PREFIX_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Invalid master key: {0}")]
    InvalidMasterKey(String),

    #[error("Secure random source unavailable")]
    Entropy,

    #[error("Encryption failed")]
    Encryption,

    /// Tampered ciphertext, wrong master key and corrupted storage all
    /// surface as this one variant.
    #[error("Decryption failed")]
    Decryption,

    #[error("Credential was issued under the hash-only scheme and must be rotated")]
    NeedsRotation,
}

/// Process-wide AES-256 master key. Never persisted with the data.
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; KEY_SIZE]>);

impl MasterKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            VaultError::InvalidMasterKey(format!(
                "expected {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(Zeroizing::new(key)))
    }

    /// Decode a base64 key as supplied in configuration.
    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| VaultError::InvalidMasterKey(format!("not valid base64: {}", e)))?,
        );
        Self::from_bytes(&bytes)
    }

    /// Fresh random key (used in tests and for bootstrapping deployments).
    pub fn generate() -> Result<Self, VaultError> {
        let bytes = Zeroizing::new(random_bytes::<KEY_SIZE>()?);
        Self::from_bytes(&bytes[..])
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Key material produced by [`CredentialVault::issue`].
///
/// `secret` is the only copy of the plaintext secret; it is handed to the
/// caller once and wiped on drop.
pub struct IssuedKey {
    pub public_id: String,
    pub secret: Zeroizing<String>,
    pub lookup_hash: String,
    pub key_prefix: String,
    pub sealed: SealedSecret,
}

impl fmt::Debug for IssuedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedKey")
            .field("key_prefix", &self.key_prefix)
            .field("lookup_hash", &self.lookup_hash)
            .finish_non_exhaustive()
    }
}

/// Issues and opens webhook credentials.
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    pub fn new(master_key: &MasterKey) -> Result<Self, VaultError> {
        let cipher = Aes256Gcm::new_from_slice(&master_key.0[..])
            .map_err(|e| VaultError::InvalidMasterKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Generate a public identifier and a secret, and seal the secret.
    pub fn issue(&self) -> Result<IssuedKey, VaultError> {
        let public_id = format!(
            "{}{}",
            PUBLIC_ID_PREFIX,
            hex::encode(random_bytes::<PUBLIC_ID_BYTES>()?)
        );
        let secret_bytes = Zeroizing::new(random_bytes::<SECRET_BYTES>()?);
        let secret = Zeroizing::new(hex::encode(&secret_bytes[..]));

        let sealed = self.seal(&secret)?;
        let lookup_hash = lookup_hash(&public_id);
        let key_prefix = display_prefix(&public_id);

        Ok(IssuedKey {
            public_id,
            secret,
            lookup_hash,
            key_prefix,
            sealed,
        })
    }

    /// Encrypt under the master key with a fresh random nonce.
    pub fn seal(&self, plaintext: &str) -> Result<SealedSecret, VaultError> {
        let nonce_bytes = random_bytes::<NONCE_SIZE>()?;
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| VaultError::Encryption)?;

        Ok(SealedSecret {
            ciphertext: STANDARD.encode(ciphertext),
            nonce: STANDARD.encode(nonce_bytes),
        })
    }

    /// Recover the plaintext secret of a credential.
    ///
    /// Every failure after the legacy check (bad base64, wrong nonce size,
    /// tag mismatch, non UTF-8 plaintext) is reported as
    /// [`VaultError::Decryption`] with no further detail.
    pub fn reveal(&self, secret: &CredentialSecret) -> Result<Zeroizing<String>, VaultError> {
        let sealed = match secret {
            CredentialSecret::Sealed(sealed) => sealed,
            CredentialSecret::LegacyHash(_) => return Err(VaultError::NeedsRotation),
        };

        let ciphertext = STANDARD
            .decode(&sealed.ciphertext)
            .map_err(|_| VaultError::Decryption)?;
        let nonce_bytes = STANDARD
            .decode(&sealed.nonce)
            .map_err(|_| VaultError::Decryption)?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(VaultError::Decryption);
        }

        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
                .map_err(|_| VaultError::Decryption)?,
        );

        let text = std::str::from_utf8(&plaintext).map_err(|_| VaultError::Decryption)?;
        Ok(Zeroizing::new(text.to_owned()))
    }
}

/// SHA-256 hex digest used to index credentials and account keys.
pub fn lookup_hash(public_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public_id.as_bytes());
    hex::encode(hasher.finalize())
}

fn display_prefix(public_id: &str) -> String {
    public_id
        .chars()
        .skip(PUBLIC_ID_PREFIX.len())
        .take(DISPLAY_PREFIX_LEN)
        .collect()
}

fn random_bytes<const N: usize>() -> Result<[u8; N], VaultError> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| VaultError::Entropy)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::new(&MasterKey::generate().unwrap()).unwrap()
    }

    fn tamper(encoded: &str, index: usize) -> String {
        let mut bytes = STANDARD.decode(encoded).unwrap();
        let i = index % bytes.len();
        bytes[i] ^= 0x01;
        STANDARD.encode(bytes)
    }

    #[test]
    fn issue_then_reveal_returns_secret() {
        let vault = vault();
        let issued = vault.issue().unwrap();

        assert!(issued.public_id.starts_with("whk_"));
        assert_eq!(issued.secret.len(), SECRET_BYTES * 2);
        assert_eq!(issued.lookup_hash, lookup_hash(&issued.public_id));
        assert_eq!(issued.key_prefix.len(), DISPLAY_PREFIX_LEN);

        let revealed = vault
            .reveal(&CredentialSecret::Sealed(issued.sealed.clone()))
            .unwrap();
        assert_eq!(revealed.as_str(), issued.secret.as_str());
    }

    #[test]
    fn sealed_form_does_not_contain_plaintext() {
        let vault = vault();
        let issued = vault.issue().unwrap();
        assert!(!issued.sealed.ciphertext.contains(issued.secret.as_str()));
        assert_ne!(issued.lookup_hash, issued.public_id);
    }

    #[test]
    fn issued_keys_are_unique() {
        let vault = vault();
        let a = vault.issue().unwrap();
        let b = vault.issue().unwrap();
        assert_ne!(a.public_id, b.public_id);
        assert_ne!(a.secret.as_str(), b.secret.as_str());
        assert_ne!(a.sealed.nonce, b.sealed.nonce);
    }

    #[test]
    fn any_tampered_byte_fails_decryption() {
        let vault = vault();
        let sealed = vault.seal("s3cret").unwrap();
        let len = STANDARD.decode(&sealed.ciphertext).unwrap().len();

        // covers both the ciphertext body and the trailing 16-byte tag
        for i in 0..len {
            let tampered = SealedSecret {
                ciphertext: tamper(&sealed.ciphertext, i),
                nonce: sealed.nonce.clone(),
            };
            let result = vault.reveal(&CredentialSecret::Sealed(tampered));
            assert!(matches!(result, Err(VaultError::Decryption)), "byte {}", i);
        }

        let bad_nonce = SealedSecret {
            ciphertext: sealed.ciphertext.clone(),
            nonce: tamper(&sealed.nonce, 0),
        };
        assert!(matches!(
            vault.reveal(&CredentialSecret::Sealed(bad_nonce)),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn wrong_master_key_looks_like_tampering() {
        let sealed = vault().seal("s3cret").unwrap();
        let other = vault();
        assert!(matches!(
            other.reveal(&CredentialSecret::Sealed(sealed)),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn garbage_storage_is_decryption_error() {
        let vault = vault();
        let sealed = SealedSecret {
            ciphertext: "%%%".to_string(),
            nonce: STANDARD.encode([0u8; 4]),
        };
        assert!(matches!(
            vault.reveal(&CredentialSecret::Sealed(sealed)),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn legacy_secret_needs_rotation() {
        let result = vault().reveal(&CredentialSecret::LegacyHash("$argon2id$...".to_string()));
        assert!(matches!(result, Err(VaultError::NeedsRotation)));
    }

    #[test]
    fn master_key_validation() {
        assert!(MasterKey::from_base64("not base64!").is_err());
        assert!(MasterKey::from_base64(&STANDARD.encode([7u8; 16])).is_err());
        assert!(MasterKey::from_base64(&STANDARD.encode([7u8; 32])).is_ok());
        assert_eq!(
            format!("{:?}", MasterKey::from_bytes(&[1u8; 32]).unwrap()),
            "MasterKey(<redacted>)"
        );
    }
}
