//! Service layer: each service owns one slice of the domain and runs its
//! units of work through the tenant-scoped transaction manager.

pub mod credentials;
pub mod orders;
pub mod processor;
pub mod products;
pub mod tenants;

pub use credentials::CredentialService;
pub use orders::OrderService;
pub use processor::{HttpProcessorClient, ProcessorClient};
pub use products::ProductService;
pub use tenants::TenantService;
