pub mod dispatch;
pub mod executor;
pub mod scheduler;

pub use dispatch::*;
pub use executor::*;
pub use scheduler::*;
