//! Domain models for the labflow system.

mod catalog;
mod patient;
mod reading;
mod request;
mod result;

pub use catalog::*;
pub use patient::*;
pub use reading::*;
pub use request::*;
pub use result::*;
