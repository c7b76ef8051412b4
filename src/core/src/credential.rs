use std::fmt;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Environment variables consulted for the credential key, in order.
pub const CREDENTIAL_KEY_ENV: [&str; 2] = ["SHELLGATE_CREDENTIAL_KEY", "ENCRYPTION_KEY"];

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{0}")]
    Malformed(String),

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("{0}")]
    Configuration(String),
}

/// 256-bit AES key shared by every codec in the process.
#[derive(Clone)]
pub struct CredentialKey([u8; KEY_LEN]);

impl CredentialKey {
    /// Build the key from the operator-supplied secret.
    ///
    /// Accepts either 64 hex characters or exactly 32 raw bytes.
    pub fn from_secret(secret: &str) -> Result<Self, CredentialError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(CredentialError::Configuration(
                "credential key is empty".to_string(),
            ));
        }
        let bytes = if secret.len() == KEY_LEN * 2 && secret.bytes().all(|b| b.is_ascii_hexdigit())
        {
            hex::decode(secret)
                .map_err(|e| CredentialError::Configuration(format!("credential key: {e}")))?
        } else if secret.len() == KEY_LEN {
            secret.as_bytes().to_vec()
        } else {
            return Err(CredentialError::Configuration(format!(
                "credential key must be {} hex characters or {KEY_LEN} bytes, got {} bytes",
                KEY_LEN * 2,
                secret.len()
            )));
        };
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    /// Read the key from the first set variable in [`CREDENTIAL_KEY_ENV`].
    pub fn from_env() -> Result<Self, CredentialError> {
        let secret = CREDENTIAL_KEY_ENV
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                CredentialError::Configuration(format!(
                    "no credential key configured; set {}",
                    CREDENTIAL_KEY_ENV[0]
                ))
            })?;
        Self::from_secret(&secret)
    }
}

impl fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialKey(<redacted>)")
    }
}

/// Decrypted login secret. Only lives for one connect attempt.
pub struct Credential(String);

impl Credential {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// AES-256-CBC codec for `"<ivHex>:<cipherHex>"` credential blobs.
#[derive(Debug, Clone)]
pub struct CredentialCodec {
    key: CredentialKey,
}

impl CredentialCodec {
    pub fn new(key: CredentialKey) -> Self {
        Self { key }
    }

    pub fn decrypt(&self, blob: &str) -> Result<Credential, CredentialError> {
        let (iv_hex, cipher_hex) = blob
            .trim()
            .split_once(':')
            .ok_or_else(|| CredentialError::Malformed("missing ':' separator".to_string()))?;
        if iv_hex.is_empty() || cipher_hex.is_empty() {
            return Err(CredentialError::Malformed("empty segment".to_string()));
        }
        let iv = hex::decode(iv_hex)
            .map_err(|e| CredentialError::Malformed(format!("iv is not hex: {e}")))?;
        let ciphertext = hex::decode(cipher_hex)
            .map_err(|e| CredentialError::Malformed(format!("ciphertext is not hex: {e}")))?;
        if iv.len() != IV_LEN {
            return Err(CredentialError::Malformed(format!(
                "iv must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }

        let cipher = Aes256CbcDec::new_from_slices(&self.key.0, &iv)
            .map_err(|_| CredentialError::DecryptionFailed)?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CredentialError::DecryptionFailed)?;
        String::from_utf8(plaintext)
            .map(Credential)
            .map_err(|_| CredentialError::DecryptionFailed)
    }

    /// Encrypt under a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let cipher = Aes256CbcEnc::new_from_slices(&self.key.0, &iv)
            .map_err(|e| CredentialError::Configuration(format!("cipher init: {e}")))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        Ok(format!("{}:{}", hex::encode(iv), hex::encode(ciphertext)))
    }
}
