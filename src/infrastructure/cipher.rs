//! Encryption of stored settings.
//!
//! Values are AES-256-CBC with PKCS#7 padding, stored as `<hex iv>:<hex ciphertext>`.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encrypted value is not <iv>:<ciphertext>")]
    Malformed,

    #[error("encrypted value is not valid hex")]
    Hex(#[from] hex::FromHexError),

    #[error("decryption failed")]
    Decrypt,

    #[error("decrypted value is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> String;
    fn decrypt(&self, stored: &str) -> Result<String, CipherError>;
}

#[derive(Clone)]
pub struct AesCbcCipher {
    key: [u8; KEY_LEN],
}

impl AesCbcCipher {
    /// Key material is the passphrase bytes, right-padded with `'0'` and cut to 32 bytes.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut key = [b'0'; KEY_LEN];
        let bytes = passphrase.as_bytes();
        let len = bytes.len().min(KEY_LEN);
        key[..len].copy_from_slice(&bytes[..len]);
        Self { key }
    }
}

impl std::fmt::Debug for AesCbcCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesCbcCipher").finish_non_exhaustive()
    }
}

impl SecretCipher for AesCbcCipher {
    fn encrypt(&self, plaintext: &str) -> String {
        let iv: [u8; IV_LEN] = rand::random();
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
    }

    fn decrypt(&self, stored: &str) -> Result<String, CipherError> {
        let (iv, ciphertext) = stored.split_once(':').ok_or(CipherError::Malformed)?;
        let iv: [u8; IV_LEN] = hex::decode(iv)?.try_into().map_err(|_| CipherError::Malformed)?;
        let ciphertext = hex::decode(ciphertext)?;

        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CipherError::Decrypt)?;

        Ok(String::from_utf8(plaintext)?)
    }
}
