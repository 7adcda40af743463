//! Security for schema operations.
//!
//! Every public catalog call goes through a [`SessionHandle`], which checks
//! that the session is open and asks its [`SecurityChecker`] whether the
//! operation is allowed. The catalog core itself assumes the caller is
//! authorized.
//!
//! # Example
//!
//! ```ignore
//! use classdb_core::security::{RoleChecker, SessionHandle};
//!
//! let checker = RoleChecker::from_strings(&["read:schema", "update:class:Person*"])?;
//! let session = SessionHandle::new("conn-1", Arc::new(checker), transactions);
//! ```

mod checker;
mod error;
mod session;

pub use checker::{
    AllowAll, Grant, Permission, ResourceGeneric, RoleChecker, SecurityChecker, TargetScope,
};
pub use error::{SecurityError, SecurityResult};
pub use session::SessionHandle;
