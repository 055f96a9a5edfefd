/// Scores a fixed-size VAD frame, returning a speech probability in `[0, 1]`.
/// The real VAD model is an external collaborator; this trait is the seam a
/// higher-fidelity model (e.g. an ONNX network) could implement in its place.
pub trait VadScorer: Send {
    fn score(&mut self, frame: &[f32]) -> f32;
}

/// RMS/energy-threshold scorer. Ships as the default so the pipeline runs
/// without an external model dependency.
pub struct EnergyVadScorer {
    floor_db: f32,
}

impl EnergyVadScorer {
    pub fn new() -> Self {
        Self { floor_db: -50.0 }
    }

    pub fn with_floor_db(floor_db: f32) -> Self {
        Self { floor_db }
    }

    fn rms(frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        ((sum_squares / frame.len() as f64).sqrt()) as f32
    }

    fn dbfs(rms: f32) -> f32 {
        if rms <= 1e-10 {
            -100.0
        } else {
            20.0 * rms.log10()
        }
    }
}

impl Default for EnergyVadScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl VadScorer for EnergyVadScorer {
    fn score(&mut self, frame: &[f32]) -> f32 {
        let db = Self::dbfs(Self::rms(frame));
        ((db - self.floor_db) / -self.floor_db).clamp(0.0, 1.0)
    }
}
