pub mod test_utils;
pub mod time;

pub use time::{Clock, ClinicHours, FixedClock, SystemClock, TimeError};
