//! Account key custody for keywarden.
//!
//! Holds the server side of the vault key hierarchy:
//! - Envelope-sealed key chains (master key -> user key -> RSA keypair -> org keys)
//! - Org key resolution by password, per membership or whole account
//! - Enrollment with confirmed org seats
//! - Credential rotation, both admin reset (org keys from the registry)
//!   and self-service (org keys recovered with the old password)
//!
//! Vault item data never passes through this crate; it custodies only
//! the keys that seal that data. Storage stays behind the [`Directory`]
//! trait so the same protocol runs against any row store.

pub mod directory;
pub mod error;
pub mod hierarchy;
pub mod registry;
pub mod rotation;
pub mod types;

pub use directory::{Directory, DirectoryTxn};
pub use error::{CustodyError, CustodyResult, StoreError, UnwrapStage};
pub use hierarchy::KeyHierarchy;
pub use registry::{OrgKeyRegistry, OrgKeyTable};
pub use rotation::RotationProtocol;
pub use types::*;
