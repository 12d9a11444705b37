pub mod chapters;
pub mod core;
pub mod courses;
pub mod enrollment;
pub mod lessons;
pub mod setup;
