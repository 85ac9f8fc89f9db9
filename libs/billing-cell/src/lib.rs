pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use error::BillingError;
pub use models::*;
pub use services::{
    BillingService, CapacityCounter, InMemorySessionCounter, RedisSessionCounter, SessionCompletionService,
    SessionCounter, SupabaseSessionCounter,
};
pub use store::{BillingStore, InMemoryBillingStore, SupabaseBillingStore};
