pub mod assessments;
pub mod core;
pub mod reports;
pub mod roster;
pub mod setup;
