/// VAD frame size at 16 kHz: 512 samples = 32 ms.
pub const WINDOW_SAMPLES_16K: usize = 512;

/// VAD frame size at 8 kHz: 256 samples, same 32 ms duration.
pub const WINDOW_SAMPLES_8K: usize = 256;

pub fn window_samples_for_rate(samplerate: u32) -> Option<usize> {
    match samplerate {
        16_000 => Some(WINDOW_SAMPLES_16K),
        8_000 => Some(WINDOW_SAMPLES_8K),
        _ => None,
    }
}
