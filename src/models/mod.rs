pub mod api;
pub mod detection;
pub mod job;
pub mod results;
