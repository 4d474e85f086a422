//! Contrasign Ledger - signature ledger and signing service
//!
//! This crate records signatures over ingested artifacts in an append-only,
//! hash-chained ledger and exposes the signing entry points used by the
//! contract-management application.

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod models;
pub mod policy;
pub mod service;
pub mod store;

pub use config::LedgerConfig;
pub use error::LedgerError;
pub use ledger::SignatureLedger;
pub use policy::{ContractStatus, SigningPolicy, SigningProgress};
pub use service::{IssuedKeys, SignedFingerprint, SigningService};
pub use store::{LedgerStore, MemoryStore, PgStore};
