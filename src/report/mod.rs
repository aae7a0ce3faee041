//! Report card lifecycle: grading, assembly, workflow status, authorization
//! and the service that ties them together.

mod aggregate;
mod assemble;
mod error;
mod guard;
mod lifecycle;
mod repo;
mod status;

pub use error::ReportError;
pub use lifecycle::ReportService;
