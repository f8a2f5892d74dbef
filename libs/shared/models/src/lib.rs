pub mod appointment;
pub mod clinic;
pub mod error;
pub mod reminder;

pub use appointment::*;
pub use clinic::*;
pub use reminder::*;
