//! Minimal ABI encoding/decoding for the handful of contract calls this
//! service makes. Words are 32 bytes, big-endian, per the Solidity ABI.

use anyhow::{Result, anyhow};

use crate::crypto::{ADDRESS_BYTES, keccak256};

pub const WORD_BYTES: usize = 32;

/// First four bytes of the keccak hash of the canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    assert!(!signature.is_empty(), "Function signature must be provided");
    assert!(
        signature.contains('(') && signature.ends_with(')'),
        "Function signature must be canonical"
    );
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

pub fn word_from_address(address: &[u8; ADDRESS_BYTES]) -> [u8; WORD_BYTES] {
    let mut word = [0u8; WORD_BYTES];
    word[WORD_BYTES - ADDRESS_BYTES..].copy_from_slice(address);
    word
}

pub fn word_from_u256(value: u128) -> [u8; WORD_BYTES] {
    let mut word = [0u8; WORD_BYTES];
    word[WORD_BYTES - 16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn call_data(signature: &str, words: &[[u8; WORD_BYTES]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + words.len() * WORD_BYTES);
    data.extend_from_slice(&selector(signature));
    for word in words {
        data.extend_from_slice(word);
    }
    data
}

pub fn decode_u256_word(data: &[u8]) -> Result<u128> {
    if data.len() < WORD_BYTES {
        return Err(anyhow!(
            "ABI word truncated: {} bytes, expected {WORD_BYTES}",
            data.len()
        ));
    }
    if data[..16].iter().any(|b| *b != 0) {
        return Err(anyhow!("ABI uint256 exceeds u128 range"));
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&data[16..WORD_BYTES]);
    Ok(u128::from_be_bytes(bytes))
}

pub fn decode_address_word(data: &[u8]) -> Result<[u8; ADDRESS_BYTES]> {
    if data.len() < WORD_BYTES {
        return Err(anyhow!(
            "ABI word truncated: {} bytes, expected {WORD_BYTES}",
            data.len()
        ));
    }
    if data[..WORD_BYTES - ADDRESS_BYTES].iter().any(|b| *b != 0) {
        return Err(anyhow!("ABI address word has non-zero padding"));
    }
    let mut address = [0u8; ADDRESS_BYTES];
    address.copy_from_slice(&data[WORD_BYTES - ADDRESS_BYTES..WORD_BYTES]);
    Ok(address)
}

/// Decode a dynamic `bytes32[]` return value: head word with the data
/// offset, then a length word, then the items.
pub fn decode_bytes32_array(data: &[u8]) -> Result<Vec<[u8; WORD_BYTES]>> {
    let offset = decode_u256_word(data)? as usize;
    if offset + WORD_BYTES > data.len() {
        return Err(anyhow!("ABI array offset {offset} out of bounds"));
    }
    let length = decode_u256_word(&data[offset..])? as usize;
    assert!(length <= 10_000, "ABI array length exceeds defensive limit");

    let items_start = offset + WORD_BYTES;
    if items_start + length * WORD_BYTES > data.len() {
        return Err(anyhow!("ABI array body truncated"));
    }

    let mut items = Vec::with_capacity(length);
    for index in 0..length {
        let start = items_start + index * WORD_BYTES;
        let mut item = [0u8; WORD_BYTES];
        item.copy_from_slice(&data[start..start + WORD_BYTES]);
        items.push(item);
    }
    Ok(items)
}

/// Parse an `0x`-prefixed JSON-RPC quantity.
pub fn parse_quantity(value: &str) -> Result<u128> {
    let trimmed = value.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("Quantity missing 0x prefix: {trimmed}"))?;
    if stripped.is_empty() {
        return Err(anyhow!("Quantity is empty"));
    }
    u128::from_str_radix(stripped, 16).map_err(|err| anyhow!("Invalid quantity: {err}"))
}

pub fn parse_hex_bytes(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(stripped).map_err(|err| anyhow!("Invalid hex payload: {err}"))
}

pub fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::parse_address;

    #[test]
    fn selector_matches_known_functions() {
        // Canonical ERC-721 selectors.
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
        assert_eq!(hex::encode(selector("ownerOf(uint256)")), "6352211e");
    }

    #[test]
    fn address_word_roundtrip() {
        let address = parse_address("0x00000000000000000000000000000000000000ff").unwrap();
        let word = word_from_address(&address);
        assert_eq!(decode_address_word(&word).unwrap(), address);
    }

    #[test]
    fn u256_word_roundtrip() {
        let word = word_from_u256(123_456_789);
        assert_eq!(decode_u256_word(&word).unwrap(), 123_456_789);
    }

    #[test]
    fn rejects_overflowing_u256() {
        let mut word = [0u8; WORD_BYTES];
        word[0] = 1;
        assert!(decode_u256_word(&word).is_err());
    }

    #[test]
    fn bytes32_array_decodes() {
        let mut data = Vec::new();
        data.extend_from_slice(&word_from_u256(32)); // offset
        data.extend_from_slice(&word_from_u256(2)); // length
        data.extend_from_slice(&[0xaa; 32]);
        data.extend_from_slice(&[0xbb; 32]);

        let items = decode_bytes32_array(&data).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], [0xaa; 32]);
        assert_eq!(items[1], [0xbb; 32]);
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x2a").unwrap(), 42);
        assert!(parse_quantity("42").is_err());
    }
}
