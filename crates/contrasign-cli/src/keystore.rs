// Keystore module - stores the local identity with its private key sealed
// by the password vault

use anyhow::{anyhow, bail, Context, Result};
use contrasign_crypto::{
    decrypt_private_key_str, encrypt_private_key, generate_keypair, sha256_hex, KdfParams,
    PrivateKey, SignatureAlgorithm,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

pub const IDENTITY_FILE: &str = "identity.json";
pub const PUBLIC_KEY_FILE: &str = "id.pub.pem";
pub const PRIVATE_KEY_FILE: &str = "id.key.enc";

const IDENTITY_VERSION: &str = "1";
const MIN_PASSPHRASE_LEN: usize = 8;

/// Public description of the local identity, stored in identity.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityInfo {
    pub version: String,
    pub algorithm: SignatureAlgorithm,
    /// First 16 hex chars of the SHA-256 of the public key PEM
    pub key_id: String,
    pub public_key_pem: String,
    pub created_at: String,
}

/// Root directory for Contrasign state: $CONTRASIGN_HOME or ~/.contrasign
pub fn contrasign_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("CONTRASIGN_HOME") {
        if !home.trim().is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    #[cfg(unix)]
    let home = std::env::var("HOME").map_err(|_| anyhow!("HOME environment variable not set"))?;

    #[cfg(windows)]
    let home = std::env::var("USERPROFILE")
        .map_err(|_| anyhow!("USERPROFILE environment variable not set"))?;

    Ok(PathBuf::from(home).join(".contrasign"))
}

pub fn identity_dir() -> Result<PathBuf> {
    Ok(contrasign_home()?.join("identity"))
}

pub fn key_id(public_key_pem: &str) -> String {
    sha256_hex(public_key_pem.trim().as_bytes())[..16].to_string()
}

/// Generates a keypair and writes identity.json, the public key and the
/// encrypted private key into `dir`.
pub fn init_identity(
    dir: &Path,
    algorithm: SignatureAlgorithm,
    passphrase: &str,
    kdf: KdfParams,
    force: bool,
) -> Result<IdentityInfo> {
    if dir.join(IDENTITY_FILE).exists() && !force {
        bail!(
            "Identity already exists at {}. Use --force to overwrite.",
            dir.display()
        );
    }

    let pair = generate_keypair(algorithm).context("Failed to generate keypair")?;
    let blob = encrypt_private_key(&pair.private_key, passphrase, kdf)
        .context("Failed to encrypt private key")?;

    let info = IdentityInfo {
        version: IDENTITY_VERSION.to_string(),
        algorithm,
        key_id: key_id(&pair.public_key_pem),
        public_key_pem: pair.public_key_pem.clone(),
        created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    write_private(&dir.join(PRIVATE_KEY_FILE), &blob.to_string())?;
    std::fs::write(dir.join(PUBLIC_KEY_FILE), &pair.public_key_pem)?;
    std::fs::write(dir.join(IDENTITY_FILE), serde_json::to_string_pretty(&info)?)?;

    tracing::info!(key_id = %info.key_id, %algorithm, "Identity written to {}", dir.display());
    Ok(info)
}

pub fn load_identity_info(dir: &Path) -> Result<IdentityInfo> {
    let path = dir.join(IDENTITY_FILE);
    let content = std::fs::read_to_string(&path).map_err(|_| {
        anyhow!(
            "No identity found at {}. Run 'contrasign identity init' first.",
            dir.display()
        )
    })?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Decrypts the private key. The key must match the stored public key.
pub fn load_private_key(dir: &Path, passphrase: &str) -> Result<PrivateKey> {
    let info = load_identity_info(dir)?;
    let blob = std::fs::read_to_string(dir.join(PRIVATE_KEY_FILE))
        .with_context(|| format!("Failed to read encrypted key in {}", dir.display()))?;

    let private_key = decrypt_private_key_str(blob.trim(), passphrase)?;
    if private_key.public_key_pem()?.trim() != info.public_key_pem.trim() {
        bail!("Encrypted key does not belong to this identity");
    }
    Ok(private_key)
}

/// Prompts for a new passphrase twice.
pub fn prompt_new_passphrase() -> Result<Zeroizing<String>> {
    let first = Zeroizing::new(rpassword::prompt_password("Enter passphrase: ")?);
    if first.chars().count() < MIN_PASSPHRASE_LEN {
        bail!("Passphrase must be at least {} characters", MIN_PASSPHRASE_LEN);
    }
    let second = Zeroizing::new(rpassword::prompt_password("Confirm passphrase: ")?);
    if *first != *second {
        bail!("Passphrases do not match");
    }
    Ok(first)
}

pub fn prompt_passphrase() -> Result<Zeroizing<String>> {
    Ok(Zeroizing::new(rpassword::prompt_password("Passphrase: ")?))
}

fn write_private(path: &Path, contents: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        file.write_all(contents.as_bytes())?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, contents)?;
    }

    Ok(())
}
