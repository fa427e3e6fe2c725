pub mod accumulator;
pub mod acquisition;
pub mod detector;
pub mod export;
pub mod frames;
pub mod orchestrator;
pub mod registry;
pub mod store;
pub mod sync;
pub mod validation;
pub mod watchdog;
pub mod worker;
