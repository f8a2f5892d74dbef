pub mod dispatcher;
pub mod notifier;
pub mod planner;
pub mod worker;

pub use dispatcher::*;
pub use notifier::*;
pub use planner::*;
pub use worker::*;
