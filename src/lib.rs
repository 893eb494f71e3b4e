pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod grid;
pub mod oracle;
pub mod output;
pub mod spectral;
pub mod stats;
pub mod waveform;
