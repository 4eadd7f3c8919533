//! Signature service: SIWE challenge messages, wallet signature
//! verification, and the backend-held EIP-712 authorizations.
//!
//! Two distinct signing roles live here. Users prove wallet control by
//! signing a plain-text SIWE message (EIP-191). The backend proves
//! eligibility by signing typed data (EIP-712) with dedicated keys, so
//! the mint transaction is submitted and paid for by the user's own
//! wallet while the contract checks the backend's authorization.

use anyhow::{Result, anyhow};
use chrono::Utc;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::crypto::{
    ADDRESS_BYTES, address_from_verifying_key, format_address, keccak256, parse_address,
    signer_address,
};
use crate::rpc::EvmRpcClient;
use crate::rpc::abi;

pub const SIWE_VERSION: &str = "1";
pub const NONCE_LEN: usize = 17;
pub const SIGNATURE_BYTES: usize = 65;

/// ERC-1271 `isValidSignature(bytes32,bytes)` magic return value.
const ERC1271_MAGIC: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];

const EIP712_DOMAIN_TYPEHASH: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const AGREEMENT_TYPEHASH: &str = "Agreement(address active,address passive)";
const MINT_MESSAGE_TYPEHASH: &str =
    "MintMessage(address owner,uint256 tokenIndex,bytes32 message)";

pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// EIP-4361 challenge text. `Issued At` is stamped at build time; all
/// other fields are caller-supplied, so the same inputs at the same
/// second produce the same message.
pub fn create_auth_message(
    address: &str,
    chain_id: u64,
    domain: &str,
    uri: &str,
    nonce: &str,
) -> String {
    assert!(!domain.is_empty(), "SIWE domain must be provided");
    assert!(!nonce.is_empty(), "SIWE nonce must be provided");
    format!(
        "{domain} wants you to sign in with your Ethereum account:\n\
         {address}\n\
         \n\
         URI: {uri}\n\
         Version: {SIWE_VERSION}\n\
         Chain ID: {chain_id}\n\
         Nonce: {nonce}\n\
         Issued At: {}",
        Utc::now().to_rfc3339()
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweFields {
    pub domain: String,
    pub address: String,
    pub uri: String,
    pub chain_id: u64,
    pub nonce: String,
}

/// Parse the fields this server validates out of a SIWE message. The
/// message must carry the exact header produced by [`create_auth_message`].
pub fn parse_auth_message(message: &str) -> Result<SiweFields> {
    let mut lines = message.lines();

    let header = lines
        .next()
        .ok_or_else(|| anyhow!("SIWE message is empty"))?;
    let domain = header
        .strip_suffix(" wants you to sign in with your Ethereum account:")
        .ok_or_else(|| anyhow!("SIWE header line malformed"))?
        .to_string();
    if domain.is_empty() {
        return Err(anyhow!("SIWE domain is empty"));
    }

    let address_line = lines
        .next()
        .ok_or_else(|| anyhow!("SIWE message missing address line"))?;
    // Validates shape; the original casing is preserved for display.
    parse_address(address_line)?;

    let mut uri = None;
    let mut chain_id = None;
    let mut nonce = None;
    for line in lines {
        if let Some(value) = line.strip_prefix("URI: ") {
            uri = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("Version: ") {
            if value != SIWE_VERSION {
                return Err(anyhow!("Unsupported SIWE version: {value}"));
            }
        } else if let Some(value) = line.strip_prefix("Chain ID: ") {
            chain_id = Some(
                value
                    .parse::<u64>()
                    .map_err(|err| anyhow!("Invalid SIWE chain id: {err}"))?,
            );
        } else if let Some(value) = line.strip_prefix("Nonce: ") {
            nonce = Some(value.to_string());
        }
    }

    Ok(SiweFields {
        domain,
        address: address_line.to_string(),
        uri: uri.ok_or_else(|| anyhow!("SIWE message missing URI"))?,
        chain_id: chain_id.ok_or_else(|| anyhow!("SIWE message missing chain id"))?,
        nonce: nonce.ok_or_else(|| anyhow!("SIWE message missing nonce"))?,
    })
}

/// EIP-191 personal-message digest.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let prefixed = format!("\x19Ethereum Signed Message:\n{}{}", message.len(), message);
    keccak256(prefixed.as_bytes())
}

pub fn decode_signature(value: &str) -> Result<[u8; SIGNATURE_BYTES]> {
    let bytes = abi::parse_hex_bytes(value)?;
    if bytes.len() != SIGNATURE_BYTES {
        return Err(anyhow!(
            "Signature must be {SIGNATURE_BYTES} bytes, got {}",
            bytes.len()
        ));
    }
    let mut out = [0u8; SIGNATURE_BYTES];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Recover the EOA that produced a personal-message signature.
pub fn recover_personal_signer(
    message: &str,
    signature: &[u8; SIGNATURE_BYTES],
) -> Result<[u8; ADDRESS_BYTES]> {
    let digest = personal_message_hash(message);
    let sig = Signature::from_slice(&signature[..64])
        .map_err(|err| anyhow!("Malformed signature: {err}"))?;
    let v = signature[64];
    let recovery_byte = if v >= 27 { v - 27 } else { v };
    let recovery = RecoveryId::try_from(recovery_byte)
        .map_err(|err| anyhow!("Invalid recovery id {v}: {err}"))?;
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery)
        .map_err(|err| anyhow!("Signature recovery failed: {err}"))?;
    Ok(address_from_verifying_key(&key))
}

/// Verify a signed SIWE message against the claimed wallet. EOA
/// signatures are checked by recovery; on mismatch the check falls back
/// to ERC-1271 for contract wallets. Every failure path returns false.
pub async fn verify_auth_signature(
    rpc: &EvmRpcClient,
    wallet_address: &str,
    message: &str,
    signature: &str,
) -> bool {
    let Ok(expected) = parse_address(wallet_address) else {
        return false;
    };
    let Ok(sig_bytes) = decode_signature(signature) else {
        return false;
    };

    if let Ok(recovered) = recover_personal_signer(message, &sig_bytes) {
        if recovered == expected {
            return true;
        }
    }

    verify_erc1271(rpc, &expected, message, &sig_bytes)
        .await
        .unwrap_or(false)
}

async fn verify_erc1271(
    rpc: &EvmRpcClient,
    wallet: &[u8; ADDRESS_BYTES],
    message: &str,
    signature: &[u8; SIGNATURE_BYTES],
) -> Result<bool> {
    let digest = personal_message_hash(message);

    // isValidSignature(bytes32 hash, bytes signature)
    let mut data = Vec::new();
    data.extend_from_slice(&abi::selector("isValidSignature(bytes32,bytes)"));
    data.extend_from_slice(&digest);
    data.extend_from_slice(&abi::word_from_u256(64)); // offset of the bytes arg
    data.extend_from_slice(&abi::word_from_u256(SIGNATURE_BYTES as u128));
    data.extend_from_slice(signature);
    data.resize(data.len() + (32 - SIGNATURE_BYTES % 32), 0);

    let response = rpc.call(&format_address(wallet), &data).await?;
    Ok(response.len() >= 4 && response[..4] == ERC1271_MAGIC)
}

/// EIP-712 domain scoped to one badge contract on one network.
#[derive(Debug, Clone)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: [u8; ADDRESS_BYTES],
}

impl Eip712Domain {
    pub fn separator(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(&keccak256(EIP712_DOMAIN_TYPEHASH.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.name.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.version.as_bytes()));
        encoded.extend_from_slice(&abi::word_from_u256(self.chain_id as u128));
        encoded.extend_from_slice(&abi::word_from_address(&self.verifying_contract));
        keccak256(&encoded)
    }

    fn digest(&self, struct_hash: &[u8; 32]) -> [u8; 32] {
        let mut preimage = Vec::with_capacity(2 + 64);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(&self.separator());
        preimage.extend_from_slice(struct_hash);
        keccak256(&preimage)
    }
}

/// Authorize `recipient` to mint via `take`: the signed struct pairs the
/// active party (recipient) with the passive backend signer.
pub fn sign_take_authorization(
    signer: &SigningKey,
    domain: &Eip712Domain,
    recipient: &[u8; ADDRESS_BYTES],
) -> Result<[u8; SIGNATURE_BYTES]> {
    let mut encoded = Vec::with_capacity(3 * 32);
    encoded.extend_from_slice(&keccak256(AGREEMENT_TYPEHASH.as_bytes()));
    encoded.extend_from_slice(&abi::word_from_address(recipient));
    encoded.extend_from_slice(&abi::word_from_address(&signer_address(signer)));
    let struct_hash = keccak256(&encoded);

    sign_digest(signer, &domain.digest(&struct_hash))
}

/// Bind an encrypted message hash to a badge and its owner.
pub fn sign_mint_message(
    signer: &SigningKey,
    domain: &Eip712Domain,
    owner: &[u8; ADDRESS_BYTES],
    token_index: u64,
    message_hash: &[u8; 32],
) -> Result<[u8; SIGNATURE_BYTES]> {
    let mut encoded = Vec::with_capacity(4 * 32);
    encoded.extend_from_slice(&keccak256(MINT_MESSAGE_TYPEHASH.as_bytes()));
    encoded.extend_from_slice(&abi::word_from_address(owner));
    encoded.extend_from_slice(&abi::word_from_u256(token_index as u128));
    encoded.extend_from_slice(message_hash);
    let struct_hash = keccak256(&encoded);

    sign_digest(signer, &domain.digest(&struct_hash))
}

fn sign_digest(signer: &SigningKey, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_BYTES]> {
    let (signature, recovery_id) = signer
        .sign_prehash_recoverable(digest)
        .map_err(|err| anyhow!("EIP-712 signing failed: {err}"))?;

    let mut out = [0u8; SIGNATURE_BYTES];
    out[..32].copy_from_slice(&signature.r().to_bytes());
    out[32..64].copy_from_slice(&signature.s().to_bytes());
    out[64] = 27 + recovery_id.to_byte();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::parse_private_key;

    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn test_domain() -> Eip712Domain {
        Eip712Domain {
            name: "SigilBadge".to_string(),
            version: "1".to_string(),
            chain_id: 99_000,
            verifying_contract: parse_address("0x00000000000000000000000000000000000000cc")
                .unwrap(),
        }
    }

    #[test]
    fn nonce_shape() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(nonce, generate_nonce());
    }

    #[test]
    fn siwe_roundtrip() {
        let address = "0xAbCdEf0123456789abcdef0123456789ABCDEF01";
        let message =
            create_auth_message(address, 99_000, "badges.example.org", "https://badges.example.org", "N0nceN0nceN0nce12");
        let fields = parse_auth_message(&message).unwrap();
        assert_eq!(fields.domain, "badges.example.org");
        assert_eq!(fields.address, address);
        assert_eq!(fields.uri, "https://badges.example.org");
        assert_eq!(fields.chain_id, 99_000);
        assert_eq!(fields.nonce, "N0nceN0nceN0nce12");
    }

    #[test]
    fn siwe_rejects_garbage() {
        assert!(parse_auth_message("").is_err());
        assert!(parse_auth_message("hello world").is_err());
        let missing_nonce = "a.example wants you to sign in with your Ethereum account:\n\
             0x00000000000000000000000000000000000000aa\n\n\
             URI: https://a.example\nVersion: 1\nChain ID: 5";
        assert!(parse_auth_message(missing_nonce).is_err());
    }

    #[test]
    fn personal_sign_recovery() {
        let key = parse_private_key(TEST_KEY).unwrap();
        let message = "sign in please";
        let digest = personal_message_hash(message);
        let (sig, recid) = key.sign_prehash_recoverable(&digest).unwrap();

        let mut bytes = [0u8; SIGNATURE_BYTES];
        bytes[..32].copy_from_slice(&sig.r().to_bytes());
        bytes[32..64].copy_from_slice(&sig.s().to_bytes());
        bytes[64] = 27 + recid.to_byte();

        let recovered = recover_personal_signer(message, &bytes).unwrap();
        assert_eq!(recovered, signer_address(&key));

        // Tampered message recovers a different address.
        let other = recover_personal_signer("sign in plz", &bytes).unwrap();
        assert_ne!(other, signer_address(&key));
    }

    #[test]
    fn take_signature_recovers_to_signer() {
        let key = parse_private_key(TEST_KEY).unwrap();
        let domain = test_domain();
        let recipient = parse_address("0x00000000000000000000000000000000000000ee").unwrap();

        let signature = sign_take_authorization(&key, &domain, &recipient).unwrap();
        assert!(signature[64] == 27 || signature[64] == 28);

        // Rebuild the digest and recover.
        let mut encoded = Vec::new();
        encoded.extend_from_slice(&keccak256(AGREEMENT_TYPEHASH.as_bytes()));
        encoded.extend_from_slice(&abi::word_from_address(&recipient));
        encoded.extend_from_slice(&abi::word_from_address(&signer_address(&key)));
        let digest = domain.digest(&keccak256(&encoded));

        let sig = Signature::from_slice(&signature[..64]).unwrap();
        let recovery = RecoveryId::try_from(signature[64] - 27).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(&digest, &sig, recovery).unwrap();
        assert_eq!(address_from_verifying_key(&recovered), signer_address(&key));
    }

    #[test]
    fn mint_message_signatures_differ_by_token() {
        let key = parse_private_key(TEST_KEY).unwrap();
        let domain = test_domain();
        let owner = parse_address("0x00000000000000000000000000000000000000dd").unwrap();
        let hash = keccak256(b"message body");

        let first = sign_mint_message(&key, &domain, &owner, 1, &hash).unwrap();
        let second = sign_mint_message(&key, &domain, &owner, 2, &hash).unwrap();
        assert_ne!(first[..64], second[..64]);
    }

    #[test]
    fn domain_separator_changes_with_chain() {
        let mut domain = test_domain();
        let first = domain.separator();
        domain.chain_id += 1;
        assert_ne!(first, domain.separator());
    }
}
