// Detached signature files: <file>.sig.json next to the artifact

use anyhow::{anyhow, Context, Result};
use contrasign_crypto::{
    fingerprint_reader, sign_fingerprint_base64, verify_detached, ArtifactInfo, DetachedSignature,
    DetachedVerification, Fingerprint, PrivateKey,
};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::keystore::IdentityInfo;

/// Default location of the signature file for `path`
pub fn signature_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".sig.json");
    PathBuf::from(name)
}

/// Streams a file through the hasher
pub fn fingerprint_file(path: &Path) -> Result<(Fingerprint, u64)> {
    let file = File::open(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
    Ok(fingerprint_reader(BufReader::new(file))?)
}

/// Signs the fingerprint of a file and builds its signature document
pub fn sign_file(
    path: &Path,
    identity: &IdentityInfo,
    private_key: &PrivateKey,
    signed_at: String,
) -> Result<DetachedSignature> {
    let (fingerprint, size) = fingerprint_file(path)?;
    let signature = sign_fingerprint_base64(&fingerprint, private_key, identity.algorithm)?;

    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(DetachedSignature::new(
        identity.algorithm,
        fingerprint,
        ArtifactInfo { name, size },
        identity.public_key_pem.clone(),
        signed_at,
        signature,
    ))
}

pub fn write_signature(path: &Path, document: &DetachedSignature) -> Result<()> {
    let json = serde_json::to_string_pretty(document)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write '{}'", path.display()))
}

pub fn read_signature(path: &Path) -> Result<DetachedSignature> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read signature file '{}': {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow!("Failed to parse signature file '{}': {}", path.display(), e))
}

/// Checks a file against a signature document, optionally pinning the
/// signer's public key
pub fn verify_file(
    path: &Path,
    document: &DetachedSignature,
    pinned_public_key_pem: Option<&str>,
) -> Result<DetachedVerification> {
    let file = File::open(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
    Ok(verify_detached(
        BufReader::new(file),
        document,
        pinned_public_key_pem,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::key_id;
    use contrasign_crypto::{generate_keypair, SignatureAlgorithm};

    fn identity(algorithm: SignatureAlgorithm) -> (IdentityInfo, PrivateKey) {
        let pair = generate_keypair(algorithm).unwrap();
        let info = IdentityInfo {
            version: "1".to_string(),
            algorithm,
            key_id: key_id(&pair.public_key_pem),
            public_key_pem: pair.public_key_pem,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };
        (info, pair.private_key)
    }

    #[test]
    fn test_signature_path_appends_suffix() {
        assert_eq!(
            signature_path(Path::new("/tmp/contract.pdf")),
            PathBuf::from("/tmp/contract.pdf.sig.json")
        );
    }

    #[test]
    fn test_sign_write_read_verify() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, b"hello world").unwrap();

        let (info, key) = identity(SignatureAlgorithm::EcdsaSha256);
        let doc = sign_file(&file, &info, &key, "2026-01-31T12:00:00Z".to_string()).unwrap();
        assert_eq!(
            doc.hash.value.to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(doc.artifact.name, "hello.txt");
        assert_eq!(doc.artifact.size, 11);

        let sig_path = signature_path(&file);
        write_signature(&sig_path, &doc).unwrap();
        let read_back = read_signature(&sig_path).unwrap();
        assert_eq!(read_back, doc);

        assert!(verify_file(&file, &read_back, None).unwrap().is_valid());
        assert!(verify_file(&file, &read_back, Some(&info.public_key_pem))
            .unwrap()
            .is_valid());
    }

    #[test]
    fn test_edited_file_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("terms.txt");
        std::fs::write(&file, b"Payment due in 30 days").unwrap();

        let (info, key) = identity(SignatureAlgorithm::EcdsaSha256);
        let doc = sign_file(&file, &info, &key, "2026-01-31T12:00:00Z".to_string()).unwrap();

        std::fs::write(&file, b"Payment due in 90 days").unwrap();
        let outcome = verify_file(&file, &doc, None).unwrap();
        assert!(matches!(outcome, DetachedVerification::HashMismatch { .. }));
    }

    #[test]
    fn test_pinned_key_rejects_substituted_signer() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("terms.txt");
        std::fs::write(&file, b"Payment due in 30 days").unwrap();

        let (mallory, mallory_key) = identity(SignatureAlgorithm::EcdsaSha256);
        let (alice, _) = identity(SignatureAlgorithm::EcdsaSha256);
        let forged = sign_file(&file, &mallory, &mallory_key, "2026-01-31T12:00:00Z".to_string()).unwrap();

        assert!(verify_file(&file, &forged, None).unwrap().is_valid());
        assert_eq!(
            verify_file(&file, &forged, Some(&alice.public_key_pem)).unwrap(),
            DetachedVerification::BadSignature
        );
    }

    #[test]
    fn test_missing_signature_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_signature(&dir.path().join("absent.sig.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read signature file"));
    }
}
