// Golden vector integration test for Contrasign
//
// Validates the implementation against the vectors in
// fixtures/golden_vectors.json. The signatures and the vault blob were
// produced by an independent implementation; if any of these fail, stored
// signatures or keys would no longer interoperate.

use contrasign_crypto::{
    decrypt_private_key_str, fingerprint, sha256_hex, verify_fingerprint,
    verify_fingerprint_base64, CryptoError, Fingerprint, SignatureAlgorithm,
};
use serde::Deserialize;
use std::fs;

#[derive(Deserialize)]
struct GoldenVectors {
    sha256: Vec<HashVector>,
    signatures: SignatureVectors,
    vault: VaultVector,
}

#[derive(Deserialize)]
struct HashVector {
    input_utf8: String,
    sha256_hex: String,
}

#[derive(Deserialize)]
struct SignatureVectors {
    message_utf8: String,
    fingerprint_hex: String,
    ecdsa: KeyedSignature,
    rsa_pss: KeyedSignature,
}

#[derive(Deserialize)]
struct KeyedSignature {
    public_key_pem: String,
    signature_base64: String,
}

#[derive(Deserialize)]
struct VaultVector {
    password: String,
    blob: String,
    public_key_pem: String,
}

fn load_golden_vectors() -> GoldenVectors {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/golden_vectors.json");
    let content = fs::read_to_string(path).expect("Failed to read golden_vectors.json");
    serde_json::from_str(&content).expect("Failed to parse golden_vectors.json")
}

#[test]
fn test_sha256_vectors() {
    let golden = load_golden_vectors();
    assert!(!golden.sha256.is_empty());

    for vector in &golden.sha256 {
        assert_eq!(
            sha256_hex(vector.input_utf8.as_bytes()),
            vector.sha256_hex,
            "hash mismatch for {:?}",
            vector.input_utf8
        );
    }
}

#[test]
fn test_fingerprint_of_signed_message() {
    let golden = load_golden_vectors();
    let computed = fingerprint(golden.signatures.message_utf8.as_bytes());
    assert_eq!(computed.to_hex(), golden.signatures.fingerprint_hex);
    assert!(computed.to_hex().starts_with("b94d27b9934d3e08a52e52d7da7dabfa"));
}

#[test]
fn test_external_ecdsa_signature_verifies() {
    let golden = load_golden_vectors();
    let fp = Fingerprint::from_hex(&golden.signatures.fingerprint_hex).unwrap();
    let vector = &golden.signatures.ecdsa;

    assert!(verify_fingerprint_base64(
        &fp,
        &vector.signature_base64,
        &vector.public_key_pem,
        SignatureAlgorithm::EcdsaSha256
    )
    .expect("well-formed inputs"));

    let other = fingerprint(b"hello world!");
    assert!(!verify_fingerprint_base64(
        &other,
        &vector.signature_base64,
        &vector.public_key_pem,
        SignatureAlgorithm::EcdsaSha256
    )
    .expect("well-formed inputs"));
}

#[test]
fn test_external_rsa_pss_signature_verifies() {
    let golden = load_golden_vectors();
    let fp = Fingerprint::from_hex(&golden.signatures.fingerprint_hex).unwrap();
    let vector = &golden.signatures.rsa_pss;

    assert!(verify_fingerprint_base64(
        &fp,
        &vector.signature_base64,
        &vector.public_key_pem,
        SignatureAlgorithm::RsaPssSha256
    )
    .expect("well-formed inputs"));
}

#[test]
fn test_rsa_pss_bit_flip_fails() {
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use base64::Engine;

    let golden = load_golden_vectors();
    let fp = Fingerprint::from_hex(&golden.signatures.fingerprint_hex).unwrap();
    let vector = &golden.signatures.rsa_pss;

    let mut signature = BASE64_STANDARD
        .decode(&vector.signature_base64)
        .expect("valid base64");
    signature[100] ^= 0x01;

    assert!(!verify_fingerprint(
        &fp,
        &signature,
        &vector.public_key_pem,
        SignatureAlgorithm::RsaPssSha256
    )
    .expect("flipped signature is still well-formed"));
}

#[test]
fn test_external_vault_blob_decrypts() {
    let golden = load_golden_vectors();
    let vault = &golden.vault;

    let key = decrypt_private_key_str(&vault.blob, &vault.password).expect("blob should open");
    assert_eq!(key.algorithm(), SignatureAlgorithm::EcdsaSha256);
    assert_eq!(key.public_key_pem().unwrap().trim(), vault.public_key_pem.trim());

    let err = decrypt_private_key_str(&vault.blob, "Correct horse").unwrap_err();
    assert!(matches!(err, CryptoError::Decryption));
}
