// Audio module - file decoding and sample-rate conversion

pub mod loader;
pub mod resample;

// Re-export commonly used types for convenience
pub use loader::{load_audio, AudioSignal};
pub use resample::resample;
