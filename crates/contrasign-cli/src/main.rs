// Contrasign CLI - local identity, detached signing and offline verification

mod detached;
mod keystore;

use std::path::Path;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use contrasign_crypto::{DetachedSignature, DetachedVerification, KdfParams, SignatureAlgorithm};

/// Contrasign - document signing and verification
#[derive(Parser)]
#[command(name = "contrasign")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage identity (init, show)
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },
    /// Print the SHA-256 fingerprint of a file
    Fingerprint {
        /// Path to the file
        path: String,
    },
    /// Sign a file, writing <file>.sig.json
    Sign {
        /// Path to the file to sign
        path: String,

        /// Print the signature document instead of writing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Verify a file against its signature
    Verify {
        /// Path to the file to verify
        path: String,

        /// Path to the signature file (defaults to <file>.sig.json)
        #[arg(short, long)]
        sig: Option<String>,

        /// Expected signer public key (PEM file); overrides the key in the signature
        #[arg(short, long, value_name = "PEM_FILE")]
        pubkey: Option<String>,
    },
}

#[derive(Subcommand)]
enum IdentityAction {
    /// Initialize a new identity
    Init {
        /// Signature algorithm: RSA-PSS-SHA256 or ECDSA-SHA256
        #[arg(short, long, default_value = "RSA-PSS-SHA256")]
        algorithm: SignatureAlgorithm,

        /// Force overwrite existing identity
        #[arg(short, long)]
        force: bool,
    },
    /// Show current identity
    Show,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CONTRASIGN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Identity { action } => handle_identity(action),
        Commands::Fingerprint { path } => handle_fingerprint(&path),
        Commands::Sign { path, dry_run } => handle_sign(&path, dry_run),
        Commands::Verify { path, sig, pubkey } => {
            handle_verify(&path, sig.as_deref(), pubkey.as_deref())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn handle_identity(action: IdentityAction) -> Result<()> {
    let dir = keystore::identity_dir()?;
    match action {
        IdentityAction::Init { algorithm, force } => {
            let passphrase = keystore::prompt_new_passphrase()?;
            let info =
                keystore::init_identity(&dir, algorithm, &passphrase, KdfParams::default(), force)?;
            println!("{} Identity initialized", "✓".green().bold());
            println!();
            println!("  Algorithm: {}", info.algorithm);
            println!("  Key ID:    {}", info.key_id);
            println!("  Location:  {}", dir.display());
            println!();
            println!("Keep your passphrase safe - it cannot be recovered!");
            Ok(())
        }
        IdentityAction::Show => {
            let info = keystore::load_identity_info(&dir)?;
            println!("  Algorithm: {}", info.algorithm);
            println!("  Key ID:    {}", info.key_id);
            println!("  Created:   {}", info.created_at);
            println!();
            print!("{}", info.public_key_pem);
            Ok(())
        }
    }
}

fn handle_fingerprint(path: &str) -> Result<()> {
    let (fingerprint, size) = detached::fingerprint_file(Path::new(path))?;
    println!("{}  {} ({} bytes)", fingerprint, path, size);
    Ok(())
}

fn handle_sign(path: &str, dry_run: bool) -> Result<()> {
    let dir = keystore::identity_dir()?;
    let identity = keystore::load_identity_info(&dir)?;

    let passphrase = keystore::prompt_passphrase()?;
    let private_key = keystore::load_private_key(&dir, &passphrase)?;

    let signed_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let document = detached::sign_file(Path::new(path), &identity, &private_key, signed_at)?;
    drop(private_key);

    if dry_run {
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    let output_path = detached::signature_path(Path::new(path));
    detached::write_signature(&output_path, &document)?;
    println!("Signature written to: {}", output_path.display());
    println!("Signer key ID: {}", identity.key_id);
    Ok(())
}

fn handle_verify(path: &str, sig_path: Option<&str>, pubkey_path: Option<&str>) -> Result<()> {
    let sig_file = match sig_path {
        Some(p) => Path::new(p).to_path_buf(),
        None => detached::signature_path(Path::new(path)),
    };
    let document = detached::read_signature(&sig_file)?;

    let pinned = pubkey_path
        .map(|p| {
            std::fs::read_to_string(p)
                .map_err(|e| anyhow!("Failed to read public key '{}': {}", p, e))
        })
        .transpose()?;

    let outcome = detached::verify_file(Path::new(path), &document, pinned.as_deref())?;
    let reason = match outcome {
        DetachedVerification::Valid => {
            print_verified(&document, pinned.as_deref());
            return Ok(());
        }
        DetachedVerification::HashMismatch { computed } => format!(
            "file fingerprint {} does not match signed fingerprint {}",
            computed, document.hash.value
        ),
        DetachedVerification::SizeMismatch { computed } => format!(
            "file size {} does not match signed size {}",
            computed, document.artifact.size
        ),
        DetachedVerification::BadSignature => "signature does not match the signer's key".to_string(),
    };

    eprintln!("{} {}", "✗".red().bold(), "Signature verification failed".red());
    eprintln!();
    eprintln!("  Reason: {}", reason);
    Err(anyhow!("verification failed"))
}

fn print_verified(document: &DetachedSignature, pinned: Option<&str>) {
    println!("{} {}", "✓".green().bold(), "Signature verified".green());
    println!();

    let signer_key_id = keystore::key_id(pinned.unwrap_or(&document.public_key_pem));
    let indicator = match keystore::identity_dir().and_then(|d| keystore::load_identity_info(&d)) {
        Ok(local) if local.key_id == signer_key_id => "(Local Identity)".cyan().to_string(),
        Ok(_) => "(External Identity)".yellow().to_string(),
        Err(_) => "(No local identity)".dimmed().to_string(),
    };
    if pinned.is_none() {
        println!(
            "  {}",
            "Signer key taken from the signature file; use --pubkey to pin it".dimmed()
        );
    }
    println!("  Signer:    {} {}", signer_key_id, indicator);
    println!("  Algorithm: {}", document.algorithm);
    println!("  Signed at: {}", document.signed_at);
    println!("  File:      {}", document.artifact.name);
}
