//! Type definitions for usage-report

mod error;
mod identity;
mod period;
mod usage;

pub use error::*;
pub use identity::*;
pub use period::*;
pub use usage::*;
