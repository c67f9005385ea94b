//! Instructor applications: public submissions and the staff review queue.

mod domain;
mod router;
mod service;


pub use domain::{
    ApplicationId, ApplicationStatus, InstructorApplication, InstructorApplicationDraft,
    UnknownApplicationStatus,
};
pub use router::instructor_router;
pub use service::{ApplicationChanges, InstructorApplications, InstructorSettings};
