use std::path::PathBuf;
use std::process::Command;

use async_trait::async_trait;
use voxstream_foundation::{BackendError, Task};

use crate::{TranscribeMode, Transcriber};

/// Decodes by writing samples to a temp WAV, invoking an external
/// whisper.cpp-compatible binary, and reading back its `.txt` output.
/// Always rejects interim mode: process spawn plus disk I/O is too slow for
/// sub-second cadence.
pub struct SubprocessBackend {
    pub bin: String,
    pub model_path: String,
    pub threads: Option<u32>,
    pub extra_args: Vec<String>,
    pub language: Option<String>,
    pub task: Task,
    pub samplerate: u32,
}

impl SubprocessBackend {
    fn write_wav(&self, samples: &[f32], path: &std::path::Path) -> Result<(), BackendError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.samplerate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &s in samples {
            let clipped = s.clamp(-1.0, 1.0);
            let scaled = (clipped * 32767.0) as i16;
            writer.write_sample(scaled)?;
        }
        writer.finalize()?;
        Ok(())
    }

    fn run(&self, wav_path: &std::path::Path, out_prefix: &std::path::Path) -> Result<(), BackendError> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(wav_path)
            .arg("-otxt")
            .arg("-of")
            .arg(out_prefix);

        if let Some(lang) = &self.language {
            cmd.arg("-l").arg(lang);
        }
        if self.task == Task::Translate {
            cmd.arg("-tr");
        }
        if let Some(threads) = self.threads {
            cmd.arg("-t").arg(threads.to_string());
        }
        cmd.args(&self.extra_args);

        let output = cmd.output()?;
        if !output.status.success() {
            return Err(BackendError::SubprocessFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transcriber for SubprocessBackend {
    async fn transcribe(&self, samples: &[f32], mode: TranscribeMode) -> Result<String, BackendError> {
        if mode == TranscribeMode::Interim {
            return Ok(String::new());
        }

        let samples = samples.to_vec();
        let bin = self.bin.clone();
        let model_path = self.model_path.clone();
        let threads = self.threads;
        let extra_args = self.extra_args.clone();
        let language = self.language.clone();
        let task = self.task;
        let samplerate = self.samplerate;

        tokio::task::spawn_blocking(move || {
            let backend = SubprocessBackend {
                bin,
                model_path,
                threads,
                extra_args,
                language,
                task,
                samplerate,
            };
            let dir = tempfile::tempdir()?;
            let wav_path = dir.path().join("segment.wav");
            let out_prefix = dir.path().join("segment");
            backend.write_wav(&samples, &wav_path)?;
            backend.run(&wav_path, &out_prefix)?;

            let txt_path: PathBuf = dir.path().join("segment.txt");
            if !txt_path.exists() {
                return Err(BackendError::MissingOutput(txt_path));
            }
            let bytes = std::fs::read(&txt_path)?;
            Ok(String::from_utf8_lossy(&bytes).trim().to_string())
        })
        .await
        .map_err(|e| BackendError::DecodeFailed(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn interim_mode_returns_empty_without_spawning() {
        let backend = SubprocessBackend {
            bin: "/nonexistent/whispercpp".into(),
            model_path: "/nonexistent/model.bin".into(),
            threads: None,
            extra_args: vec![],
            language: None,
            task: Task::Transcribe,
            samplerate: 16_000,
        };
        let result = backend
            .transcribe(&[0.0f32; 1600], TranscribeMode::Interim)
            .await
            .unwrap();
        assert_eq!(result, "");
    }

    #[test]
    fn wav_round_trip_preserves_samples_within_quantization_error() {
        let backend = SubprocessBackend {
            bin: String::new(),
            model_path: String::new(),
            threads: None,
            extra_args: vec![],
            language: None,
            task: Task::Transcribe,
            samplerate: 16_000,
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wav");
        let samples = vec![0.5f32, -0.5, 0.0, 1.0, -1.0];
        backend.write_wav(&samples, &path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let decoded: Vec<f32> = reader
            .samples::<i16>()
            .map(|s| s.unwrap() as f32 / 32767.0)
            .collect();

        for (orig, got) in samples.iter().zip(decoded.iter()) {
            assert!((orig - got).abs() <= 1.0 / 32767.0 + 1e-6);
        }
    }
}
