pub mod config;
pub mod constants;
pub mod energy;
pub mod state;

pub use config::VadSegmenterConfig;
pub use constants::{window_samples_for_rate, WINDOW_SAMPLES_16K, WINDOW_SAMPLES_8K};
pub use energy::{EnergyVadScorer, VadScorer};
pub use state::{VadSegment, VadSegmenter};
