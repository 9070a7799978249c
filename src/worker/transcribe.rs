use super::process::run_tool;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Speech-to-text for a single audio segment.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognized text of one segment. An error or an empty string means the
    /// segment could not be interpreted.
    async fn recognize(&self, segment: &Path) -> Result<String>;
}

/// Runs whisper-cli once per segment and reads the plain text from stdout.
pub struct WhisperCliRecognizer {
    whisper_cli_path: PathBuf,
    model_path: PathBuf,
    language: String,
}

impl WhisperCliRecognizer {
    /// Fails up front when the model file is missing so a misconfigured run
    /// stops before any episode is touched.
    pub fn new(
        whisper_cli_path: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        language: impl Into<String>,
    ) -> Result<Self> {
        let model_path = model_path.into();
        if !model_path.exists() {
            return Err(PipelineError::Config(format!("Model not found: {:?}", model_path)));
        }
        Ok(Self {
            whisper_cli_path: whisper_cli_path.into(),
            model_path,
            language: language.into(),
        })
    }
}

#[async_trait]
impl Recognizer for WhisperCliRecognizer {
    async fn recognize(&self, segment: &Path) -> Result<String> {
        log::debug!("Recognizing from {:?} via whisper-cli", segment);
        let output = run_tool(
            &self.whisper_cli_path,
            [
                OsStr::new("-m"),
                self.model_path.as_os_str(),
                OsStr::new("-f"),
                segment.as_os_str(),
                OsStr::new("-l"),
                OsStr::new(&self.language),
                OsStr::new("-nt"),
                OsStr::new("-np"),
            ],
        )
        .await
        .map_err(PipelineError::Recognition)?;

        Ok(output.stdout.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

/// Transcribe segments in order and join them into one transcript.
///
/// A segment that cannot be recognized is logged and contributes nothing.
/// When no segment at all is recognized the transcript is a diagnostic
/// placeholder, so the episode still reaches the cross-reference stage.
pub async fn transcribe_segments(recognizer: &dyn Recognizer, segments: &[PathBuf]) -> String {
    let mut whole_text = String::new();
    let mut recognized = 0usize;
    let mut last_failure = String::from("no segments");

    for segment in segments {
        match recognizer.recognize(segment).await {
            Ok(text) if !text.trim().is_empty() => {
                whole_text.push_str(&as_sentence(&text));
                recognized += 1;
            }
            Ok(_) => {
                log::warn!("No speech recognized in segment {:?}", segment);
                last_failure = format!("no interpretable speech in {:?}", segment);
            }
            Err(e) => {
                log::warn!("Skipping segment {:?}: {}", segment, e);
                last_failure = e.to_string();
            }
        }
    }

    if recognized == 0 {
        log::error!(
            "None of {} segments could be recognized, writing placeholder transcript",
            segments.len()
        );
        return placeholder_transcript(&last_failure);
    }

    log::debug!("Recognized {}/{} segments", recognized, segments.len());
    whole_text
}

pub fn placeholder_transcript(reason: &str) -> String {
    format!("[transcription unavailable: {}]", reason)
}

/// Capitalize the first letter and terminate with ". ".
fn as_sentence(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let mut sentence = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    sentence.push_str(". ");
    sentence
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct ScriptedRecognizer {
        replies: HashMap<String, std::result::Result<String, String>>,
    }

    #[async_trait]
    impl Recognizer for ScriptedRecognizer {
        async fn recognize(&self, segment: &Path) -> Result<String> {
            let name = segment.file_name().unwrap().to_string_lossy().to_string();
            match self.replies.get(&name) {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(e)) => Err(PipelineError::Recognition(e.clone())),
                None => Err(PipelineError::Recognition("unknown segment".into())),
            }
        }
    }

    fn recognizer(replies: &[(&str, std::result::Result<&str, &str>)]) -> ScriptedRecognizer {
        ScriptedRecognizer {
            replies: replies
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(str::to_string).map_err(str::to_string)))
                .collect(),
        }
    }

    fn segments(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("chunks1").join(n)).collect()
    }

    #[test]
    fn test_as_sentence() {
        assert_eq!(as_sentence("  wie in folge 12 erzählt "), "Wie in folge 12 erzählt. ");
        assert_eq!(as_sentence("über sterne"), "Über sterne. ");
    }

    #[tokio::test]
    async fn test_segments_joined_in_order() {
        let r = recognizer(&[("chunk1.wav", Ok("hallo")), ("chunk2.wav", Ok("folge 3"))]);
        let text = transcribe_segments(&r, &segments(&["chunk1.wav", "chunk2.wav"])).await;
        assert_eq!(text, "Hallo. Folge 3. ");
    }

    #[tokio::test]
    async fn test_failed_segment_is_skipped() {
        let r = recognizer(&[
            ("chunk1.wav", Ok("erste")),
            ("chunk2.wav", Err("service unreachable")),
            ("chunk3.wav", Ok("")),
            ("chunk4.wav", Ok("dritte")),
        ]);
        let text = transcribe_segments(
            &r,
            &segments(&["chunk1.wav", "chunk2.wav", "chunk3.wav", "chunk4.wav"]),
        )
        .await;
        assert_eq!(text, "Erste. Dritte. ");
    }

    #[tokio::test]
    async fn test_all_segments_failing_yields_placeholder() {
        let r = recognizer(&[("chunk1.wav", Err("timeout")), ("chunk2.wav", Err("quota"))]);
        let text = transcribe_segments(&r, &segments(&["chunk1.wav", "chunk2.wav"])).await;
        assert!(text.starts_with("[transcription unavailable"));
        assert!(text.contains("quota"));
    }

    #[test]
    fn test_missing_model_is_config_error() {
        let err = WhisperCliRecognizer::new("whisper-cli", "/nonexistent/ggml-base.bin", "de")
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }
}
