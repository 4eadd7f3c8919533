//! Legacy (EIP-155) transaction construction for the faucet's
//! `mintNativeCoin` submissions. The unsigned payload is RLP-encoded with
//! `(chain_id, 0, 0)` trailing fields, keccak-hashed, signed with a
//! recoverable secp256k1 signature, then re-encoded with `v, r, s`.

use anyhow::{Result, anyhow};
use k256::ecdsa::SigningKey;
use rlp::RlpStream;

use crate::crypto::{ADDRESS_BYTES, keccak256};

#[derive(Debug, Clone)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: [u8; ADDRESS_BYTES],
    pub value: u128,
    pub data: Vec<u8>,
}

impl LegacyTransaction {
    /// Produce the raw signed transaction bytes for `eth_sendRawTransaction`.
    pub fn sign(&self, chain_id: u64, key: &SigningKey) -> Result<Vec<u8>> {
        assert!(chain_id > 0, "EIP-155 requires a positive chain id");
        assert!(
            self.gas_limit >= 21_000,
            "Gas limit below intrinsic transaction cost"
        );

        let digest = keccak256(&self.encode(chain_id, None));
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&digest)
            .map_err(|err| anyhow!("Transaction signing failed: {err}"))?;

        let v = 35 + 2 * chain_id + u64::from(recovery_id.to_byte());
        let r = signature.r().to_bytes();
        let s = signature.s().to_bytes();

        Ok(self.encode(chain_id, Some((v, r.as_slice(), s.as_slice()))))
    }

    fn encode(&self, chain_id: u64, signature: Option<(u64, &[u8], &[u8])>) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        stream.append(&trim_leading_zeros(&self.nonce.to_be_bytes()));
        stream.append(&trim_leading_zeros(&self.gas_price.to_be_bytes()));
        stream.append(&trim_leading_zeros(&self.gas_limit.to_be_bytes()));
        stream.append(&self.to.to_vec());
        stream.append(&trim_leading_zeros(&self.value.to_be_bytes()));
        stream.append(&self.data);
        match signature {
            Some((v, r, s)) => {
                stream.append(&trim_leading_zeros(&v.to_be_bytes()));
                stream.append(&trim_leading_zeros(r));
                stream.append(&trim_leading_zeros(s));
            }
            None => {
                // Unsigned EIP-155 preimage: (chain_id, 0, 0).
                stream.append(&trim_leading_zeros(&chain_id.to_be_bytes()));
                stream.append_empty_data();
                stream.append_empty_data();
            }
        }
        stream.out().to_vec()
    }
}

/// RLP integers are minimal big-endian byte strings; zero is empty.
fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address_from_verifying_key, parse_private_key};
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
    use rlp::Rlp;

    fn sample_tx() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: [0x35; ADDRESS_BYTES],
            value: 1_000_000_000_000_000_000,
            data: Vec::new(),
        }
    }

    #[test]
    fn trims_to_minimal_encoding() {
        assert_eq!(trim_leading_zeros(&0u64.to_be_bytes()), Vec::<u8>::new());
        assert_eq!(trim_leading_zeros(&1u64.to_be_bytes()), vec![1]);
        assert_eq!(trim_leading_zeros(&256u64.to_be_bytes()), vec![1, 0]);
    }

    #[test]
    fn unsigned_payload_is_nine_items() {
        let encoded = sample_tx().encode(1, None);
        let rlp = Rlp::new(&encoded);
        assert!(rlp.is_list());
        assert_eq!(rlp.item_count().unwrap(), 9);
        // Trailing EIP-155 fields: chain id then two empty strings.
        let chain: u64 = rlp.val_at(6).unwrap();
        assert_eq!(chain, 1);
    }

    #[test]
    fn signed_transaction_recovers_sender() {
        let key = parse_private_key(
            "0x4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        let chain_id = 1;
        let tx = sample_tx();
        let raw = tx.sign(chain_id, &key).unwrap();

        let rlp = Rlp::new(&raw);
        assert_eq!(rlp.item_count().unwrap(), 9);
        let v: u64 = rlp.val_at(6).unwrap();
        let r: Vec<u8> = rlp.val_at(7).unwrap();
        let s: Vec<u8> = rlp.val_at(8).unwrap();
        assert!(v == 37 || v == 38);

        let mut sig_bytes = [0u8; 64];
        sig_bytes[32 - r.len()..32].copy_from_slice(&r);
        sig_bytes[64 - s.len()..].copy_from_slice(&s);
        let signature = Signature::from_slice(&sig_bytes).unwrap();
        let recovery = RecoveryId::try_from((v - 35 - 2 * chain_id) as u8).unwrap();

        let digest = keccak256(&tx.encode(chain_id, None));
        let recovered =
            VerifyingKey::recover_from_prehash(&digest, &signature, recovery).unwrap();
        assert_eq!(
            address_from_verifying_key(&recovered),
            address_from_verifying_key(key.verifying_key())
        );
    }
}
