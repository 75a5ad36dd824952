pub mod assessment;
pub mod assignment;
pub mod attendance;
pub mod audit;
pub mod catalog;
pub mod enrollment;
pub mod grade;
pub mod reports;
pub mod semester;

mod error;

pub use error::EngineError;
