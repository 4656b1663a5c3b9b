#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Keeps the TLS identity of an Intel AMT device in sync with a certificate
//! issued by an ACME client.
//!
//! A run loads the certificate and RSA key written by the ACME client, makes
//! sure an identical credential exists on the device (reusing what is already
//! there, matched by content rather than by name), activates it as the
//! device's TLS identity and deletes the credential it replaces, keeping the
//! old key if another certificate still uses it.
//!
//! The device is reached through the [`CredentialStore`] trait. The crate
//! ships [`MemoryStore`], an in-memory implementation with a recorded call
//! trace.
//!
//! ```no_run
//! use amt_certupdater::{CertManager, Config, MemoryStore, Outcome};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.json")?;
//! let bundle = config.load_bundle()?;
//!
//! # let store = MemoryStore::new();
//! let mut manager = CertManager::new(store);
//! match manager.reconcile(&bundle)? {
//!     Outcome::Unchanged(_) => println!("certificate already active"),
//!     Outcome::Replaced { previous, current, .. } => {
//!         println!("replaced {previous} with {current}")
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **`logging`** (default): log progress through the `log` crate.
//! - **`tracing`**: log progress as `tracing` events instead.

mod observability;
mod prelude;

pub mod bundle;
pub mod cache;
pub mod cert;
pub mod config;
pub mod error;
pub mod manager;
pub mod store;

// -----------------------
// Re-exports
// -----------------------

pub use crate::{
    bundle::{BundleError, CredentialBundle, DecodeError},
    cache::{CacheState, CredentialCache},
    cert::{Certificate, PrivateKey, PublicKey},
    config::{Config, ConfigError, ConnectionParams},
    error::{Error, NotFound},
    manager::{CertManager, KeyDisposition, Outcome},
    store::{CredentialStore, Handle, HandlePair, MemoryStore, Operation, StoreCall, StoreError},
};
