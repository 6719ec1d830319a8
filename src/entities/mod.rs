//! Persistence entities.
//!
//! Every tenant-scoped table carries a `tenant_id` column; the storage
//! engine's row-level-security policies filter on it using the session
//! setting bound by [`crate::db::TenantDb`].

pub mod order;
pub mod payment;
pub mod processor_credential;
pub mod product;
pub mod tenant;
