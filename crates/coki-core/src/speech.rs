//! Speech-to-text input.
//!
//! Dictation is best effort. A [`Dictation`] guard holds whatever resource
//! the recognizer acquired and releases it when the guard is finished or
//! dropped, so an abandoned screen never leaves the microphone open.

use thiserror::Error;
use tracing::debug;

/// Shown when the host has no recognizer
pub const SPEECH_UNSUPPORTED_TEXT: &str = "Voice input is not supported in this terminal.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpeechError {
    #[error("speech recognition is not supported")]
    Unsupported,
}

pub trait SpeechInput: Send + Sync {
    fn listen(&self) -> Result<Dictation, SpeechError>;
}

/// An active recognition session
pub struct Dictation {
    release: Option<Box<dyn FnOnce() + Send>>,
    transcript: String,
}

impl Dictation {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
            transcript: String::new(),
        }
    }

    pub fn push_result(&mut self, text: &str) {
        self.transcript.push_str(text);
    }

    /// End the session and hand back the recognized text
    pub fn finish(mut self) -> String {
        self.release_now();
        std::mem::take(&mut self.transcript)
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            debug!("releasing speech recognizer");
            release();
        }
    }
}

impl Drop for Dictation {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// Recognizer for hosts without a speech API
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedSpeech;

impl SpeechInput for UnsupportedSpeech {
    fn listen(&self) -> Result<Dictation, SpeechError> {
        Err(SpeechError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn counting_dictation() -> (Dictation, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let dictation = Dictation::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (dictation, released)
    }

    #[test]
    fn test_unsupported_recognizer() {
        assert_eq!(UnsupportedSpeech.listen().err(), Some(SpeechError::Unsupported));
    }

    #[test]
    fn test_finish_releases_once() {
        let (mut dictation, released) = counting_dictation();
        dictation.push_result("hello ");
        dictation.push_result("world");

        assert_eq!(dictation.finish(), "hello world");
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let (dictation, released) = counting_dictation();
        drop(dictation);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
