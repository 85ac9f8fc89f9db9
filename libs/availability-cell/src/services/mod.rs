pub mod resolver;
pub mod slots;

pub use resolver::AvailabilityResolver;
pub use slots::{SlotGenerator, SlotService};
