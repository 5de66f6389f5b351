//! Access-control primitives.
//!
//! Persistence operations that are restricted to certain users take an
//! explicit [`AccessContext`] argument. `AccessContext::System` is the
//! narrowly-scoped capability used when a workflow step performs a save on
//! the acting user's behalf that the user could not perform directly (e.g.
//! invoice-line creation during sale confirmation). There is no global
//! privilege switch: elevation lasts exactly as long as the call that
//! received the `System` context.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::UserId;

/// A named permission, e.g. `"invoice_line.write"`.
///
/// `"*"` is the wildcard and grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity under which an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessContext {
    /// System capability: every permission check passes. Hand this out per
    /// call, never store it in ambient state.
    System,
    /// A user with an explicit permission set.
    User {
        user: UserId,
        permissions: Vec<Permission>,
    },
}

impl AccessContext {
    pub fn system() -> Self {
        Self::System
    }

    pub fn user(user: UserId, permissions: Vec<Permission>) -> Self {
        Self::User { user, permissions }
    }

    /// The acting user, if any (`None` for the system context).
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::System => None,
            Self::User { user, .. } => Some(*user),
        }
    }

    /// Pure policy check: no IO, no panics.
    pub fn allows(&self, required: &Permission) -> bool {
        match self {
            Self::System => true,
            Self::User { permissions, .. } => permissions
                .iter()
                .any(|p| p.is_wildcard() || p == required),
        }
    }

    /// Check a permission, turning a miss into [`DomainError::Forbidden`].
    pub fn authorize(&self, required: &Permission) -> DomainResult<()> {
        if self.allows(required) {
            Ok(())
        } else {
            Err(DomainError::forbidden(required.as_str()))
        }
    }
}
