use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Key management error: {0}")]
    KeyMaterial(String),
    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// AES variant picked from the key length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeySize {
    Aes128,
    Aes192,
    Aes256,
}

/// Derives URL-safe tokens from serials with AES-CBC under a static key/IV
///
/// The key/IV pair is process-wide configuration: build one encoder at
/// startup and share it. Bad key material fails here, never per call.
///
/// Tokens are standard base64 of the ciphertext re-encoded into the URL-safe
/// alphabet (`+`→`-`, `/`→`_`) with trailing `=` stripped, so a redirect
/// server holding the same key can decode them.
#[derive(Clone)]
pub struct TokenEncoder {
    key: Vec<u8>,
    iv: [u8; 16],
    key_size: KeySize,
}

impl std::fmt::Debug for TokenEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEncoder")
            .field("key_size", &self.key_size)
            .finish_non_exhaustive()
    }
}

impl TokenEncoder {
    /// Create an encoder from UTF-8 key and IV strings
    pub fn new(key: &str, iv: &str) -> Result<Self, EncryptionError> {
        let key = key.as_bytes().to_vec();
        let key_size = match key.len() {
            16 => KeySize::Aes128,
            24 => KeySize::Aes192,
            32 => KeySize::Aes256,
            n => {
                return Err(EncryptionError::KeyMaterial(format!(
                    "Invalid key length {}, expected 16, 24 or 32 bytes",
                    n
                )))
            }
        };

        let iv: [u8; 16] = iv.as_bytes().try_into().map_err(|_| {
            EncryptionError::KeyMaterial(format!(
                "Invalid IV length {}, expected 16 bytes",
                iv.len()
            ))
        })?;

        Ok(TokenEncoder { key, iv, key_size })
    }

    /// Encrypt a serial into its URL-safe token
    pub fn encode(&self, serial: &str) -> String {
        let plaintext = serial.as_bytes();

        // Key and IV lengths are validated in new(), so construction cannot fail
        let ciphertext = match self.key_size {
            KeySize::Aes128 => Aes128CbcEnc::new(self.key.as_slice().into(), &self.iv.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            KeySize::Aes192 => Aes192CbcEnc::new(self.key.as_slice().into(), &self.iv.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            KeySize::Aes256 => Aes256CbcEnc::new(self.key.as_slice().into(), &self.iv.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };

        URL_SAFE_NO_PAD.encode(ciphertext)
    }

    /// Recover the serial from a URL-safe token
    pub fn decode(&self, token: &str) -> Result<String, EncryptionError> {
        let ciphertext = URL_SAFE_NO_PAD
            .decode(token.trim_end_matches('='))
            .map_err(|e| EncryptionError::Decryption(format!("Invalid token encoding: {}", e)))?;

        let plaintext = match self.key_size {
            KeySize::Aes128 => Aes128CbcDec::new(self.key.as_slice().into(), &self.iv.into())
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
            KeySize::Aes192 => Aes192CbcDec::new(self.key.as_slice().into(), &self.iv.into())
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
            KeySize::Aes256 => Aes256CbcDec::new(self.key.as_slice().into(), &self.iv.into())
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
        }
        .map_err(|e| EncryptionError::Decryption(format!("AES-CBC decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| EncryptionError::Decryption(format!("Token is not UTF-8: {}", e)))
    }
}
