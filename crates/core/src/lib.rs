//! `saleflow-core` — domain foundation building blocks.
//!
//! Typed identifiers, the domain error model, the `Entity` trait and the
//! access-control primitives shared by every other crate. Pure domain code:
//! no IO, no storage, no framework concerns.

pub mod access;
pub mod entity;
pub mod error;
pub mod id;

pub use access::{AccessContext, Permission};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
