pub mod audio_models;
pub mod config;
pub mod error;
pub mod file_descriptor;
pub mod state;
