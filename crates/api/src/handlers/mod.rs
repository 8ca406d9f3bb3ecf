pub mod jobs;
pub mod system;
