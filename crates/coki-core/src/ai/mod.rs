pub mod gemini;

pub use gemini::{GeminiClient, Models};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ServiceError;
use crate::image::{GeneratedImage, ImageSize};
use crate::search::SearchOutcome;
use crate::session::{ChatEvent, Submission};
use crate::state::Turn;

/// Remote chat capability with server streaming.
///
/// Implementations are stateless: every call carries the whole transcript.
/// `on_fragment` receives each non-empty text fragment in arrival order.
/// The future resolves `Ok` once the stream ends naturally and `Err` on any
/// transport or remote failure. There are no retries.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        prior_turns: &[Turn],
        message: &str,
        on_fragment: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<(), ServiceError>;
}

/// Remote grounded web search
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchOutcome, ServiceError>;
}

/// Remote text-to-image generation
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, size: ImageSize) -> Result<GeneratedImage, ServiceError>;
}

/// Run one submission against `transport`, passing every fragment and then
/// exactly one terminal event to `emit`, in order.
pub async fn dispatch<T, F>(transport: &T, submission: Submission, mut emit: F)
where
    T: ChatTransport + ?Sized,
    F: FnMut(ChatEvent) + Send,
{
    let id = submission.id;
    let mut on_fragment = |text: &str| {
        emit(ChatEvent::Fragment {
            id,
            text: text.to_string(),
        })
    };

    let result = transport
        .send(&submission.prior_turns, &submission.message, &mut on_fragment)
        .await;

    let terminal = match result {
        Ok(()) => ChatEvent::Completed { id },
        Err(error) => ChatEvent::Failed { id, error },
    };
    debug!(id, ok = matches!(terminal, ChatEvent::Completed { .. }), "chat dispatch finished");
    emit(terminal);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Plays back a fixed list of fragments, then succeeds or fails
    pub struct ScriptedTransport {
        pub fragments: Vec<String>,
        pub fail: bool,
        pub calls: Arc<Mutex<Vec<(Vec<Turn>, String)>>>,
    }

    impl ScriptedTransport {
        pub fn new(fragments: &[&str], fail: bool) -> Self {
            Self {
                fragments: fragments.iter().map(|f| f.to_string()).collect(),
                fail,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send(
            &self,
            prior_turns: &[Turn],
            message: &str,
            on_fragment: &mut (dyn for<'a> FnMut(&'a str) + Send),
        ) -> Result<(), ServiceError> {
            self.calls
                .lock()
                .unwrap()
                .push((prior_turns.to_vec(), message.to_string()));
            for fragment in &self.fragments {
                on_fragment(fragment);
            }
            if self.fail {
                Err(ServiceError::Stream("scripted failure".to_string()))
            } else {
                Ok(())
            }
        }
    }
}
