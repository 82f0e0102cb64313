pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod service;
pub mod store;

pub use config::AppConfig;
pub use error::{StoreError, StoreResult};
pub use service::{LinkService, ReconciliationJob};
pub use store::{create_pool, LinkStore, MemLinkStore, PgLinkStore};
