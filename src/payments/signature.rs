//! Processor notification signatures.
//!
//! # Design Decisions
//! - Verification runs over the raw request bytes, before any decoding
//! - Every decoding failure is an invalid signature, never an error

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::Sha512;

/// Verifies a processor notification signature.
///
/// The processor sends `X-Signature: <base64>`, an RSA PKCS#1 v1.5 signature
/// with SHA-512 over the exact request body. The key may be SPKI
/// (`BEGIN PUBLIC KEY`) or PKCS#1 (`BEGIN RSA PUBLIC KEY`) PEM. Any decoding
/// failure counts as an invalid signature.
pub fn verify(public_key_pem: &str, body: &[u8], signature_header: &str) -> bool {
    let Ok(raw_sig) = STANDARD.decode(signature_header.trim()) else {
        return false;
    };

    let Some(key) = RsaPublicKey::from_public_key_pem(public_key_pem)
        .ok()
        .or_else(|| RsaPublicKey::from_pkcs1_pem(public_key_pem).ok())
    else {
        return false;
    };

    let Ok(signature) = Signature::try_from(raw_sig.as_slice()) else {
        return false;
    };

    VerifyingKey::<Sha512>::new(key).verify(body, &signature).is_ok()
}
