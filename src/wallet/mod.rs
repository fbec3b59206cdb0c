//! Custodial wallet subsystem.
//!
//! # Data Flow
//! ```text
//! identifier (email or 0x address)
//!     → store.rs (lookup / create, keystore persistence, signing)
//!     → SignedTx { hash, raw } handed to the chain client
//!
//! address + signature
//!     → ownership.rs (EIP-191 signer recovery)
//! ```
//!
//! # Security Constraints
//! - Key material is generated from OS entropy, never derived from the identifier
//! - Signers never leave `WalletStore`; callers hold a `WalletHandle`
//! - Private keys are never logged

pub mod ownership;
pub mod store;

pub use ownership::verify_signature;
pub use store::{SignedTx, UnsignedTx, WalletError, WalletHandle, WalletStore};
