pub mod config;
pub mod models;
pub mod status;
pub mod transcribe;
