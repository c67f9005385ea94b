pub mod courses;
pub mod directory;
pub mod enrollment;
pub mod instructors;
