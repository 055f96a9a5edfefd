use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadSegmenterConfig {
    pub enabled: bool,
    pub threshold: f32,
    pub end_silence_ms: u32,
    pub pre_roll_ms: u32,
    pub min_speech_ms: u32,
    pub max_speech_ms: u32,
    pub samplerate: u32,
}

impl Default for VadSegmenterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.5,
            end_silence_ms: 300,
            pre_roll_ms: 150,
            min_speech_ms: 400,
            max_speech_ms: 15_000,
            samplerate: 16_000,
        }
    }
}
