use serde::Serialize;

use voxstream_foundation::Task;

pub fn task_str(task: Task) -> &'static str {
    match task {
        Task::Transcribe => "transcribe",
        Task::Translate => "translate",
    }
}

/// Where a final transcript's audio came from; interims are always
/// `Interim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Chunk,
    Vad,
    Interim,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Chunk => "chunk",
            Source::Vad => "vad",
            Source::Interim => "interim",
        }
    }
}

/// Outbound JSON record for both finals and interims, delivered as a single
/// WebSocket text frame.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptRecord {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub seq: u64,
    pub timestamp_ms: i64,
    pub text: String,
    pub is_interim: bool,
    pub source: &'static str,
    pub model: String,
    pub language: Option<String>,
    pub task: &'static str,
    pub sample_rate: u32,
    pub duration_ms: u64,
}

impl TranscriptRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seq: u64,
        text: String,
        is_interim: bool,
        source: Source,
        model: &str,
        language: Option<String>,
        task: Task,
        sample_rate: u32,
        duration_ms: u64,
    ) -> Self {
        let id = if is_interim {
            "interim".to_string()
        } else {
            uuid::Uuid::new_v4().to_string()
        };
        Self {
            kind: "transcript",
            id,
            seq,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            text,
            is_interim,
            source: source.as_str(),
            model: model.to_string(),
            language,
            task: task_str(task),
            sample_rate,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_record_gets_a_uuid_id() {
        let record = TranscriptRecord::new(
            1,
            "hello".into(),
            false,
            Source::Chunk,
            "whisper",
            None,
            Task::Transcribe,
            16_000,
            500,
        );
        assert!(uuid::Uuid::parse_str(&record.id).is_ok());
        assert_eq!(record.source, "chunk");
    }

    #[test]
    fn interim_record_uses_fixed_id() {
        let record = TranscriptRecord::new(
            1,
            "hel".into(),
            true,
            Source::Interim,
            "whisper",
            None,
            Task::Transcribe,
            16_000,
            300,
        );
        assert_eq!(record.id, "interim");
        assert!(record.is_interim);
    }
}
