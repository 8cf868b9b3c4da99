//! Storage seam for account and membership rows.
//!
//! Custody logic never talks to a database directly. Reads go through
//! [`Directory`]; every rotation's writes are buffered in one
//! [`DirectoryTxn`] and published atomically by `commit`. Dropping a
//! transaction without committing discards its writes. Backends must
//! serialize transactions touching the same user so two concurrent
//! rotations cannot interleave their row updates.

use crate::error::StoreError;
use crate::types::{MembershipRecord, MembershipRotation, UserRecord, UserRotation};
use uuid::Uuid;

/// Read and transactional-write access to account rows.
pub trait Directory: Send + Sync {
    /// Looks up one account by email. `Ok(None)` when absent.
    fn get_user(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// All memberships for one user, any status.
    fn list_memberships(&self, user_id: Uuid) -> Result<Vec<MembershipRecord>, StoreError>;

    /// Opens a write transaction.
    fn begin(&self) -> Result<Box<dyn DirectoryTxn + '_>, StoreError>;
}

/// A buffered batch of row writes.
pub trait DirectoryTxn {
    /// Stages a new account row. Fails if the email is taken.
    fn create_user(&mut self, user: &UserRecord) -> Result<(), StoreError>;

    /// Stages replacement credential columns for an existing row.
    fn update_user(&mut self, rotation: &UserRotation) -> Result<(), StoreError>;

    /// Stages a new membership row.
    fn create_membership(&mut self, membership: &MembershipRecord) -> Result<(), StoreError>;

    /// Stages a replacement sealed org key for an existing membership.
    fn update_membership(&mut self, rotation: &MembershipRotation) -> Result<(), StoreError>;

    /// Publishes every staged write at once.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
