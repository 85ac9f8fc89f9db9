pub mod booking;
pub mod conflict;
pub mod debounce;
pub mod lifecycle;
pub mod reschedule;
pub mod staff;
pub mod transfer;

pub use booking::AppointmentBookingService;
pub use conflict::{check_conflict, ConflictDetectionService, ConflictDetector};
pub use debounce::Debouncer;
pub use lifecycle::AppointmentLifecycleService;
pub use reschedule::{RescheduleService, RescheduleSession, RescheduleState};
pub use staff::{InMemoryStaffDirectory, StaffDirectory, SupabaseStaffDirectory};
pub use transfer::{TransferRejection, TransferService, TransferSession, TransferState};
