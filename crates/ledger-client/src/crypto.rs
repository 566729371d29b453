//! Host-side verification of device signatures.
//!
//! The device signs with secp256k1 ECDSA over a Keccak-256 digest:
//!
//! - **Transactions**: `digest = keccak256(raw_tx)`
//! - **Personal messages**: `digest = keccak256(PREFIX || len || message)`
//!   where `len` is the decimal ASCII length of the message
//!
//! Verification uses the raw `(r, s)` scalars from the
//! [`SignatureResult`], not a DER encoding. Both verifiers are pure: they
//! never touch the device and report an invalid signature as `false`
//! rather than as an error.
//!
//! # Example
//!
//! ```
//! use cfx_ledger_client::crypto::{personal_message_payload, PERSONAL_SIGN_PREFIX};
//!
//! let payload = personal_message_payload(b"Hello, world!");
//! assert!(payload.starts_with(PERSONAL_SIGN_PREFIX));
//! assert!(payload.ends_with(b"13Hello, world!"));
//! ```

use alloy_primitives::{B256, keccak256};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use tracing::trace;

use crate::signature::SignatureResult;

/// Domain separation prefix of personal-message signing.
pub const PERSONAL_SIGN_PREFIX: &[u8] = b"\x19Conflux Signed Message:\n";

/// Type nibble of user account addresses.
const USER_ACCOUNT_TYPE: u8 = 0x10;

/// Returns the digest the device signs for a transaction.
#[must_use]
pub fn transaction_digest(raw_transaction: &[u8]) -> B256 {
    keccak256(raw_transaction)
}

/// Builds `PREFIX || decimal_len(message) || message`.
#[must_use]
pub fn personal_message_payload(message: &[u8]) -> Vec<u8> {
    let len = message.len().to_string();

    let mut payload = Vec::with_capacity(PERSONAL_SIGN_PREFIX.len() + len.len() + message.len());
    payload.extend_from_slice(PERSONAL_SIGN_PREFIX);
    payload.extend_from_slice(len.as_bytes());
    payload.extend_from_slice(message);
    payload
}

/// Returns the digest the device signs for a personal message.
#[must_use]
pub fn personal_message_digest(message: &[u8]) -> B256 {
    keccak256(personal_message_payload(message))
}

/// Verifies a transaction signature.
///
/// # Arguments
///
/// * `public_key` - SEC1-encoded secp256k1 public key, as returned by
///   `GetPublicKey`
/// * `signature` - The signature returned by `SignTx`
/// * `raw_transaction` - The exact bytes that were sent for signing
///
/// # Returns
///
/// [`true`](bool) if the signature is valid, [`false`](bool) otherwise,
/// including when the key or signature cannot be parsed.
#[must_use]
pub fn verify_transaction_signature(
    public_key: &[u8],
    signature: &SignatureResult,
    raw_transaction: &[u8],
) -> bool {
    verify_digest(public_key, &transaction_digest(raw_transaction), signature)
}

/// Verifies a personal-message signature.
///
/// The digest is rebuilt with [`PERSONAL_SIGN_PREFIX`] before verification,
/// so `message` is the raw message as sent to the device.
#[must_use]
pub fn verify_personal_message_signature(
    public_key: &[u8],
    signature: &SignatureResult,
    message: &[u8],
) -> bool {
    verify_digest(public_key, &personal_message_digest(message), signature)
}

/// Verifies a raw `(r, s)` signature over a precomputed digest.
///
/// High-S signatures are normalized before verification.
#[must_use]
pub fn verify_digest(public_key: &[u8], digest: &B256, signature: &SignatureResult) -> bool {
    let Ok(signature) = Signature::from_slice(&signature.rs_bytes()) else {
        trace!("signature scalars out of range");
        return false;
    };
    verify_prehash(public_key, digest, &signature)
}

/// Verifies a DER-encoded signature over `keccak256(data)`.
#[must_use]
pub fn verify_der_signature(public_key: &[u8], der: &[u8], data: &[u8]) -> bool {
    let Ok(signature) = Signature::from_der(der) else {
        trace!("malformed DER signature");
        return false;
    };
    verify_prehash(public_key, &keccak256(data), &signature)
}

fn verify_prehash(public_key: &[u8], digest: &B256, signature: &Signature) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(public_key) else {
        trace!("public key is not a valid SEC1 point");
        return false;
    };
    let signature = signature.normalize_s().unwrap_or(*signature);

    verifying_key
        .verify_prehash(digest.as_slice(), &signature)
        .is_ok()
}

/// Derives the 20-byte account address of a public key.
///
/// The address is the last 20 bytes of the Keccak-256 hash of the
/// uncompressed point (without its `0x04` tag), with the high nibble of the
/// first byte replaced by the user-account type `0x1`.
#[must_use]
pub fn account_address(public_key: &VerifyingKey) -> [u8; 20] {
    let point = public_key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address[0] = (address[0] & 0x0F) | USER_ACCOUNT_TYPE;
    address
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::SigningKey;

    use super::*;

    /// The order of the secp256k1 curve.
    const N: [u8; 32] = [
        0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
        0xFE, 0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36,
        0x41, 0x41,
    ];

    fn key() -> SigningKey {
        SigningKey::from_slice(&[0x2A; 32]).unwrap()
    }

    fn public_key(key: &SigningKey) -> Vec<u8> {
        key.verifying_key().to_encoded_point(false).as_bytes().to_vec()
    }

    fn sign(key: &SigningKey, digest: &B256) -> SignatureResult {
        let (signature, recovery_id) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();
        let bytes = signature.to_bytes();

        let mut r = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        let mut s = [0u8; 32];
        s.copy_from_slice(&bytes[32..]);
        SignatureResult::new(recovery_id.to_byte(), r, s)
    }

    /// Computes a - b for 32-byte big-endian integers.
    fn subtract(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
        let mut result = [0u8; 32];
        let mut borrow = 0i32;

        for i in (0..32).rev() {
            let diff = i32::from(a[i]) - i32::from(b[i]) - borrow;
            if diff < 0 {
                result[i] = (diff + 256) as u8;
                borrow = 1;
            } else {
                result[i] = diff as u8;
                borrow = 0;
            }
        }

        result
    }

    #[test]
    fn transaction_signature_verifies() {
        let key = key();
        let tx = b"opaque serialized transaction";
        let sig = sign(&key, &transaction_digest(tx));

        assert!(verify_transaction_signature(&public_key(&key), &sig, tx));
    }

    #[test]
    fn flipped_bits_fail() {
        let key = key();
        let pk = public_key(&key);
        let tx = b"opaque serialized transaction".to_vec();
        let sig = sign(&key, &transaction_digest(&tx));

        let mut tampered_tx = tx.clone();
        tampered_tx[3] ^= 0x01;
        assert!(!verify_transaction_signature(&pk, &sig, &tampered_tx));

        let mut r = *sig.r();
        r[31] ^= 0x01;
        let bad_r = SignatureResult::new(sig.v(), r, *sig.s());
        assert!(!verify_transaction_signature(&pk, &bad_r, &tx));

        let mut s = *sig.s();
        s[0] ^= 0x01;
        let bad_s = SignatureResult::new(sig.v(), *sig.r(), s);
        assert!(!verify_transaction_signature(&pk, &bad_s, &tx));
    }

    #[test]
    fn personal_message_digest_uses_prefix_and_decimal_length() {
        let message = b"Hello, world!";
        let mut expected = b"\x19Conflux Signed Message:\n".to_vec();
        expected.extend_from_slice(b"13");
        expected.extend_from_slice(message);

        assert_eq!(personal_message_payload(message), expected);
        assert_eq!(personal_message_digest(message), keccak256(&expected));
    }

    #[test]
    fn personal_message_signature_verifies() {
        let key = key();
        let message = b"Hello, world!";
        let sig = sign(&key, &personal_message_digest(message));

        assert!(verify_personal_message_signature(&public_key(&key), &sig, message));
    }

    #[test]
    fn personal_message_rejects_other_digests() {
        let key = key();
        let pk = public_key(&key);
        let message = b"Hello, world!";

        // Signed without the prefix.
        let unprefixed = sign(&key, &keccak256(message));
        assert!(!verify_personal_message_signature(&pk, &unprefixed, message));

        // Signed as a transaction instead.
        let tx_sig = sign(&key, &transaction_digest(message));
        assert!(!verify_personal_message_signature(&pk, &tx_sig, message));
    }

    #[test]
    fn wrong_key_fails() {
        let tx = b"payload";
        let sig = sign(&key(), &transaction_digest(tx));
        let other = SigningKey::from_slice(&[0x07; 32]).unwrap();

        assert!(!verify_transaction_signature(&public_key(&other), &sig, tx));
    }

    #[test]
    fn compressed_public_key_is_accepted() {
        let key = key();
        let compressed = key.verifying_key().to_encoded_point(true).as_bytes().to_vec();
        let tx = b"payload";
        let sig = sign(&key, &transaction_digest(tx));

        assert!(verify_transaction_signature(&compressed, &sig, tx));
    }

    #[test]
    fn high_s_signature_is_normalized() {
        let key = key();
        let tx = b"payload";
        let sig = sign(&key, &transaction_digest(tx));
        let high = SignatureResult::new(sig.v() ^ 1, *sig.r(), subtract(&N, sig.s()));

        assert!(verify_transaction_signature(&public_key(&key), &high, tx));
    }

    #[test]
    fn garbage_inputs_return_false() {
        let sig = SignatureResult::new(0, [0u8; 32], [0u8; 32]);
        assert!(!verify_transaction_signature(&public_key(&key()), &sig, b"x"));

        let sig = sign(&key(), &transaction_digest(b"x"));
        assert!(!verify_transaction_signature(&[0x04; 65], &sig, b"x"));
        assert!(!verify_transaction_signature(&[], &sig, b"x"));
    }

    #[test]
    fn der_signature_verifies() {
        let key = key();
        let data = b"der encoded";
        let (signature, _) = key
            .sign_prehash_recoverable(keccak256(data).as_slice())
            .unwrap();
        let der = signature.to_der();

        assert!(verify_der_signature(&public_key(&key), der.as_bytes(), data));
        assert!(!verify_der_signature(&public_key(&key), der.as_bytes(), b"other"));
        assert!(!verify_der_signature(&public_key(&key), &[0x30, 0x00], data));
    }

    #[test]
    fn account_address_sets_type_nibble() {
        let address = account_address(key().verifying_key());
        assert_eq!(address[0] & 0xF0, 0x10);
    }
}
