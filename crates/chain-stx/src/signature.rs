//! Inserting an externally produced signature into a Stacks transaction.
//!
//! Nothing here checks that the signature is valid for the transaction; the
//! signer and the node that receives the broadcast own that.

use crate::error::StxError;
use crate::transaction::{MessageSignature, StacksTransaction, SIGNATURE_LENGTH};

/// Wrap raw recoverable signature bytes into the slot encoding.
///
/// Accepts the 65 byte `recovery id || r || s` form only.
pub fn encode_signature(raw: &[u8]) -> Result<MessageSignature, StxError> {
    let bytes: [u8; SIGNATURE_LENGTH] = raw.try_into().map_err(|_| {
        StxError::InvalidSignature(format!(
            "expected {SIGNATURE_LENGTH} bytes, got {}",
            raw.len()
        ))
    })?;
    Ok(MessageSignature(bytes))
}

/// Hex variant of [`encode_signature`]; an optional `0x` prefix is allowed.
pub fn encode_signature_hex(raw_hex: &str) -> Result<MessageSignature, StxError> {
    let trimmed = raw_hex.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let raw = hex::decode(trimmed)
        .map_err(|e| StxError::InvalidSignature(format!("invalid hex: {e}")))?;
    encode_signature(&raw)
}

/// Put `signature` into the origin's single-signature slot.
pub fn patch_signature(mut tx: StacksTransaction, signature: MessageSignature) -> StacksTransaction {
    tx.auth.origin_mut().signature = signature;
    tx
}

/// Deserialize `raw_tx`, encode `raw_signature` and patch it in.
pub fn apply_signature(raw_tx: &[u8], raw_signature: &[u8]) -> Result<StacksTransaction, StxError> {
    let tx = StacksTransaction::deserialize(raw_tx)?;
    let signature = encode_signature(raw_signature)?;
    Ok(patch_signature(tx, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::tests::{sponsored_tx, standard_tx};
    use crate::transaction::TransactionAuth;

    fn raw_signature(seed: u8) -> Vec<u8> {
        let mut raw: Vec<u8> = (0..SIGNATURE_LENGTH as u8).map(|i| i.wrapping_mul(seed)).collect();
        raw[0] = 0x01;
        raw
    }

    #[test]
    fn encode_accepts_exactly_65_bytes() {
        let raw = raw_signature(3);
        assert_eq!(encode_signature(&raw).unwrap().as_bytes().as_slice(), raw.as_slice());

        for len in [0usize, 64, 66] {
            let err = encode_signature(&vec![1u8; len]).unwrap_err();
            assert_eq!(err.code(), "STX_INVALID_SIGNATURE");
        }
    }

    #[test]
    fn encode_from_hex() {
        let raw = raw_signature(5);
        let from_hex = encode_signature_hex(&format!("0x{}", hex::encode(&raw))).unwrap();
        assert_eq!(from_hex, encode_signature(&raw).unwrap());
        assert!(encode_signature_hex("not hex").is_err());
    }

    #[test]
    fn patched_slot_reads_back() {
        for seed in [1u8, 7, 0xff] {
            let signature = encode_signature(&raw_signature(seed)).unwrap();
            let patched = patch_signature(standard_tx(), signature);
            assert_eq!(patched.origin_signature(), signature);
        }
    }

    #[test]
    fn patch_leaves_everything_else_untouched() {
        let original = standard_tx();
        let signature = encode_signature(&raw_signature(9)).unwrap();
        let patched = patch_signature(original.clone(), signature);

        assert_eq!(patched.version, original.version);
        assert_eq!(patched.chain_id, original.chain_id);
        assert_eq!(patched.remainder, original.remainder);
        assert_eq!(patched.auth.origin().nonce, original.auth.origin().nonce);

        let bytes = patched.serialize();
        assert_eq!(bytes.len(), original.serialize().len());
        // signature is the last field of the origin condition
        assert_eq!(&bytes[6 + 38..6 + 103], signature.as_bytes().as_slice());
    }

    #[test]
    fn sponsored_patch_targets_origin_only() {
        let signature = encode_signature(&raw_signature(11)).unwrap();
        let patched = patch_signature(sponsored_tx(), signature);
        match &patched.auth {
            TransactionAuth::Sponsored { origin, sponsor } => {
                assert_eq!(origin.signature, signature);
                assert!(sponsor.signature.is_empty());
            }
            other => panic!("expected sponsored auth, got {other:?}"),
        }
    }

    #[test]
    fn apply_from_raw_bytes() {
        let unsigned = standard_tx();
        let raw = raw_signature(13);
        let patched = apply_signature(&unsigned.serialize(), &raw).unwrap();

        assert_eq!(patched.origin_signature().as_bytes().as_slice(), raw.as_slice());
        assert_ne!(patched.txid(), unsigned.txid());

        let reparsed = StacksTransaction::deserialize(&patched.serialize()).unwrap();
        assert_eq!(reparsed, patched);
    }

    #[test]
    fn apply_rejects_bad_inputs() {
        let bytes = standard_tx().serialize();
        assert_eq!(
            apply_signature(&bytes, &[0u8; 10]).unwrap_err().code(),
            "STX_INVALID_SIGNATURE"
        );
        assert_eq!(
            apply_signature(&bytes[..20], &raw_signature(1)).unwrap_err().code(),
            "STX_SERIALIZATION_ERROR"
        );
    }
}
