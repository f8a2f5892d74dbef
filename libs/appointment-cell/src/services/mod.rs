pub mod conflict;
pub mod lifecycle;
pub mod schedule;

pub use conflict::ConflictChecker;
pub use lifecycle::AppointmentLifecycleService;
pub use schedule::ScheduleValidator;
