pub mod dashboard;
pub mod enums;
pub mod patient;
pub mod prescription;

pub use dashboard::*;
pub use patient::*;
pub use prescription::*;
