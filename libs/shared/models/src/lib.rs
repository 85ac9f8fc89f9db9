pub mod appointment;
pub mod error;
pub mod staff;
pub mod time;

pub use appointment::{Appointment, AppointmentId, AppointmentStatus};
pub use staff::{StaffId, StaffMember, StaffRole};
