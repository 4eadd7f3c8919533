//! Ethereum and confidentiality primitives shared across the service:
//! keccak hashing, address handling, backend signing keys, and the
//! AES-256-GCM envelope used for stored chat messages.

use aes_gcm::aead::{Aead, KeyInit, OsRng, rand_core::RngCore};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use k256::ecdsa::{SigningKey, VerifyingKey};
use tiny_keccak::{Hasher, Keccak};

pub const ADDRESS_BYTES: usize = 20;
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// Content key for a stored chat message: keccak256 over the packed
/// encoding of (owner address, message bytes). Stable across time so the
/// same message by the same owner always maps to the same record.
pub fn hash_chat_message(owner: &[u8; ADDRESS_BYTES], message: &str) -> [u8; 32] {
    let mut packed = Vec::with_capacity(ADDRESS_BYTES + message.len());
    packed.extend_from_slice(owner);
    packed.extend_from_slice(message.as_bytes());
    keccak256(&packed)
}

pub fn parse_address(value: &str) -> Result<[u8; ADDRESS_BYTES]> {
    let trimmed = value.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(stripped)
        .map_err(|err| anyhow!("Failed to decode address as hex: {err}"))?;
    if bytes.len() != ADDRESS_BYTES {
        return Err(anyhow!(
            "Address must be {ADDRESS_BYTES} bytes, got {}",
            bytes.len()
        ));
    }
    let mut out = [0u8; ADDRESS_BYTES];
    out.copy_from_slice(&bytes);
    Ok(out)
}

pub fn format_address(bytes: &[u8; ADDRESS_BYTES]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Lower-cased storage key for a wallet address, validated.
pub fn normalize_address(value: &str) -> Result<String> {
    let parsed = parse_address(value)?;
    Ok(format_address(&parsed))
}

pub fn parse_private_key(value: &str) -> Result<SigningKey> {
    let trimmed = value.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(stripped)
        .map_err(|err| anyhow!("Failed to decode private key as hex: {err}"))?;
    SigningKey::from_slice(&bytes).map_err(|err| anyhow!("Invalid secp256k1 key: {err}"))
}

/// Last 20 bytes of the keccak hash of the uncompressed public key.
pub fn address_from_verifying_key(key: &VerifyingKey) -> [u8; ADDRESS_BYTES] {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; ADDRESS_BYTES];
    address.copy_from_slice(&digest[12..]);
    address
}

pub fn signer_address(key: &SigningKey) -> [u8; ADDRESS_BYTES] {
    address_from_verifying_key(key.verifying_key())
}

const GCM_NONCE_BYTES: usize = 12;

pub struct EncryptedMessage {
    pub ciphertext: String,
    pub iv: String,
}

/// AES-256-GCM with a random 96-bit nonce; ciphertext and nonce are
/// returned base64-encoded for storage.
pub fn encrypt_message(key: &[u8; 32], plaintext: &str) -> Result<EncryptedMessage> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; GCM_NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|err| anyhow!("Encryption failed: {err}"))?;

    Ok(EncryptedMessage {
        ciphertext: BASE64_STANDARD.encode(ciphertext),
        iv: BASE64_STANDARD.encode(nonce_bytes),
    })
}

pub fn decrypt_message(key: &[u8; 32], iv: &str, ciphertext: &str) -> Result<String> {
    let nonce_bytes = BASE64_STANDARD
        .decode(iv)
        .map_err(|err| anyhow!("Failed to decode iv: {err}"))?;
    if nonce_bytes.len() != GCM_NONCE_BYTES {
        return Err(anyhow!(
            "IV must be {GCM_NONCE_BYTES} bytes, got {}",
            nonce_bytes.len()
        ));
    }
    let data = BASE64_STANDARD
        .decode(ciphertext)
        .map_err(|err| anyhow!("Failed to decode ciphertext: {err}"))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), data.as_slice())
        .map_err(|err| anyhow!("Decryption failed: {err}"))?;

    String::from_utf8(plaintext).map_err(|err| anyhow!("Decrypted payload not UTF-8: {err}"))
}

pub fn decode_encryption_key(value: &str) -> Result<[u8; 32]> {
    let bytes = BASE64_STANDARD
        .decode(value.trim())
        .map_err(|err| anyhow!("Failed to decode encryption key as base64: {err}"))?;
    if bytes.len() != 32 {
        return Err(anyhow!(
            "Encryption key must be 32 bytes, got {}",
            bytes.len()
        ));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        key.copy_from_slice(&keccak256(b"test key material"));
        key
    }

    #[test]
    fn keccak_known_vector() {
        // keccak256("") from the yellow paper
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = test_key();
        let message = "The last badge holder leaves the light on.";

        let envelope = encrypt_message(&key, message).unwrap();
        assert_ne!(envelope.ciphertext, message);

        let decrypted = decrypt_message(&key, &envelope.iv, &envelope.ciphertext).unwrap();
        assert_eq!(decrypted, message);
    }

    #[test]
    fn wrong_key_fails() {
        let key = test_key();
        let mut other = key;
        other[0] ^= 0xff;

        let envelope = encrypt_message(&key, "secret").unwrap();
        assert!(decrypt_message(&other, &envelope.iv, &envelope.ciphertext).is_err());
    }

    #[test]
    fn message_hash_is_time_independent() {
        let owner = parse_address("0x00000000000000000000000000000000000000aa").unwrap();
        let first = hash_chat_message(&owner, "hello");
        let second = hash_chat_message(&owner, "hello");
        assert_eq!(first, second);

        let other_owner = parse_address("0x00000000000000000000000000000000000000bb").unwrap();
        assert_ne!(first, hash_chat_message(&other_owner, "hello"));
        assert_ne!(first, hash_chat_message(&owner, "hello!"));
    }

    #[test]
    fn address_roundtrip_and_normalization() {
        let mixed = "0xAbCdEf0123456789abcdef0123456789ABCDEF01";
        let normalized = normalize_address(mixed).unwrap();
        assert_eq!(normalized, mixed.to_ascii_lowercase());
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("not hex").is_err());
    }

    #[test]
    fn signer_address_matches_recovery() {
        let key = parse_private_key(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        )
        .unwrap();
        let address = signer_address(&key);
        // Known address for this widely-used test vector key.
        assert_eq!(
            format_address(&address),
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
    }
}
