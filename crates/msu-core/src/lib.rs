//! MSU Core - playback, import and export for MSU-1 track preparation

pub mod audio;
pub mod audio_file;
pub mod config;
pub mod engine;
pub mod export;
pub mod import;
pub mod timeline;
pub mod types;

pub use types::*;
