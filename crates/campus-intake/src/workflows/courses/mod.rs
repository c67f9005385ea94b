//! Course catalog, intake batches, and the cached schedule overrides.

pub mod batches;
pub mod catalog;
pub mod overrides;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use batches::{Batch, BatchDraft, BatchId, BatchPatch, BatchRepository, BatchStatus};
pub use catalog::{Catalog, CourseDefinition, Instructor, TBA};
pub use overrides::{CourseOverride, CourseOverrides, CourseView, OverrideCache};
pub use router::course_router;
pub use service::{CourseService, CourseSummary, EnrollmentClosure};
