//! SSH credential loading and signing

use std::path::Path;
use std::sync::Arc;

use russh::keys::ssh_key::{HashAlg, PrivateKey, PublicKey, SshSig};
use russh::keys::decode_secret_key;
use tracing::debug;

/// Namespace used for signatures produced by [`CredentialStore::sign`]
pub const SIGNATURE_NAMESPACE: &str = "margo";

/// Key loading and signing errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to read key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse key file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("no identity at index {0}")]
    NoSuchIdentity(usize),

    #[error("signing failed: {0}")]
    Sign(String),
}

/// Set of private keys usable for public-key authentication
///
/// A store is built for a single connection attempt and dropped with it.
#[derive(Default)]
pub struct CredentialStore {
    keys: Vec<Arc<PrivateKey>>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fingerprints: Vec<String> = self
            .keys
            .iter()
            .map(|k| k.public_key().fingerprint(HashAlg::Sha256).to_string())
            .collect();
        f.debug_struct("CredentialStore")
            .field("keys", &fingerprints)
            .finish()
    }
}

impl CredentialStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the single key read from `path`
    ///
    /// # Errors
    /// Returns `KeyError::Io` if the file cannot be read and `KeyError::Parse`
    /// if it is not a valid private key encoding
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let mut store = Self::new();
        store.add_key_file(path)?;
        Ok(store)
    }

    /// Read a private key file and append it to the store
    ///
    /// # Errors
    /// Same as [`CredentialStore::load`]
    pub fn add_key_file(&mut self, path: impl AsRef<Path>) -> Result<(), KeyError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let bytes = std::fs::read(path).map_err(|source| KeyError::Io {
            path: display.clone(),
            source,
        })?;
        let contents = String::from_utf8(bytes).map_err(|_| KeyError::Parse {
            path: display.clone(),
            reason: "key file is not PEM/OpenSSH text".to_string(),
        })?;
        let key = decode_secret_key(&contents, None).map_err(|e| KeyError::Parse {
            path: display.clone(),
            reason: e.to_string(),
        })?;

        debug!(
            path = %path.display(),
            fingerprint = %key.public_key().fingerprint(HashAlg::Sha256),
            "loaded private key"
        );

        self.keys.push(Arc::new(key));
        Ok(())
    }

    /// Number of loaded identities
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Public half of identity `index`, or `None` when out of range
    #[must_use]
    pub fn public_key(&self, index: usize) -> Option<PublicKey> {
        self.keys.get(index).map(|k| k.public_key().clone())
    }

    /// Sign `data` with identity `index`
    ///
    /// # Errors
    /// Returns `KeyError::NoSuchIdentity` for an out-of-range index and
    /// `KeyError::Sign` if the underlying signature operation fails
    pub fn sign(&self, index: usize, data: &[u8]) -> Result<SshSig, KeyError> {
        let key = self
            .keys
            .get(index)
            .ok_or(KeyError::NoSuchIdentity(index))?;
        key.sign(SIGNATURE_NAMESPACE, HashAlg::Sha512, data)
            .map_err(|e| KeyError::Sign(e.to_string()))
    }

    /// Loaded identities in load order, for the authentication handshake
    pub fn identities(&self) -> impl Iterator<Item = &Arc<PrivateKey>> {
        self.keys.iter()
    }
}
