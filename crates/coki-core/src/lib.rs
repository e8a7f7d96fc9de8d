pub mod ai;
pub mod config;
pub mod credentials;
pub mod error;
pub mod history;
pub mod image;
pub mod search;
pub mod session;
pub mod speech;
pub mod state;

// Re-export main types for convenience
pub use ai::{dispatch, ChatTransport, GeminiClient, ImageGenerator, Models, WebSearch};
pub use config::Config;
pub use credentials::{resolve_api_key, KeySelector, KeySource, ResolvedKey};
pub use error::ServiceError;
pub use history::SearchHistory;
pub use image::{GeneratedImage, ImageSize};
pub use search::{dedupe_links, SearchLink, SearchOutcome};
pub use session::{ChatEvent, ChatSession, Submission, APOLOGY_TEXT};
pub use speech::{Dictation, SpeechError, SpeechInput, UnsupportedSpeech};
pub use state::{AppMode, Role, SessionStatus, Turn};
