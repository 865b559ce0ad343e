pub mod engine;
pub mod recorder;
pub mod ticker;
