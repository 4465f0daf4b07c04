// AES-CBC helpers for protecting payload contents
//
// The IV is taken from the first block of the key. This matches payloads
// already encrypted by existing tooling; two messages encrypted under the same
// key therefore share an IV.

use crate::errors::CipherError;
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

fn key_iv(key: &[u8]) -> Result<(&[u8], &[u8]), CipherError> {
    match key.len() {
        16 | 24 | 32 => Ok((key, &key[..BLOCK_SIZE])),
        n => Err(CipherError::InvalidKeyLength(n)),
    }
}

/// Encrypt `plaintext` with PKCS#7 padding and return the raw ciphertext
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CipherError> {
    let (key, iv) = key_iv(key)?;
    let invalid = |_| CipherError::InvalidKeyLength(key.len());

    let ciphertext = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        _ => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
    };
    Ok(ciphertext)
}

/// Encrypt and encode the ciphertext with standard base64
pub fn encrypt_base64(plaintext: &[u8], key: &[u8]) -> Result<String, CipherError> {
    encrypt(plaintext, key).map(|ciphertext| STANDARD.encode(ciphertext))
}

/// Decrypt a base64 encoded ciphertext
///
/// The last decrypted byte is trusted as the padding length. A wrong key
/// usually produces garbage rather than an error, so only decrypt input
/// produced under a key you control.
pub fn decrypt(ciphertext: &str, key: &[u8]) -> Result<Vec<u8>, CipherError> {
    let (key, iv) = key_iv(key)?;
    let data = STANDARD.decode(ciphertext.trim())?;
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::MalformedCiphertext(format!(
            "length {} is not a positive multiple of {}",
            data.len(),
            BLOCK_SIZE
        )));
    }

    let invalid = |_| CipherError::InvalidKeyLength(key.len());
    let malformed = |_| CipherError::MalformedCiphertext("incomplete block".to_string());

    let plaintext = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<NoPadding>(&data)
            .map_err(malformed)?,
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<NoPadding>(&data)
            .map_err(malformed)?,
        _ => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<NoPadding>(&data)
            .map_err(malformed)?,
    };
    unpad(plaintext)
}

fn unpad(mut data: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    let pad = match data.last() {
        Some(&last) => last as usize,
        None => return Ok(data),
    };
    if pad > data.len() {
        return Err(CipherError::MalformedCiphertext(format!(
            "padding length {} exceeds data length {}",
            pad,
            data.len()
        )));
    }
    data.truncate(data.len() - pad);
    Ok(data)
}
