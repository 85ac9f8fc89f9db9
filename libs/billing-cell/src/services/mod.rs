pub mod billing;
pub mod completion;
pub mod counter;

pub use billing::BillingService;
pub use completion::SessionCompletionService;
pub use counter::{
    CapacityCounter, InMemorySessionCounter, RedisSessionCounter, SessionCounter, SupabaseSessionCounter,
};
