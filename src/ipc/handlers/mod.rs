pub mod assignment;
pub mod attendance;
pub mod audit;
pub mod catalog;
pub mod core;
pub mod enrollment;
pub mod reports;
pub mod scoring;
pub mod semester;
