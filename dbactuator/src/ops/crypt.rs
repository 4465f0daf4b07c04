// Encrypt and decrypt values with the actuator key

use crate::cli::{CryptArgs, CryptCommand};
use anyhow::{Context, Result};
use common::crypto;

/// Encrypted value as base64, or the decrypted plaintext
pub fn execute(command: &CryptCommand) -> Result<String> {
    match command {
        CryptCommand::Encrypt(CryptArgs { value, key }) => {
            Ok(crypto::encrypt_base64(value.as_bytes(), key.as_bytes())?)
        }
        CryptCommand::Decrypt(CryptArgs { value, key }) => {
            let plaintext = crypto::decrypt(value, key.as_bytes())?;
            String::from_utf8(plaintext).context("decrypted value is not valid UTF-8")
        }
    }
}
