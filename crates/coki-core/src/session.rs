//! Conversation state machine for the streaming chat mode.
//!
//! A submission appends the user's turn plus an empty model placeholder,
//! then the placeholder is rewritten as fragments stream in. The session
//! is the only thing allowed to touch the transcript; transports report
//! back through [`ChatEvent`]s or the three `on_*` callbacks.

use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::state::{Role, SessionStatus, Turn};

/// Shown in place of a response whose stream failed
pub const APOLOGY_TEXT: &str = "I'm having trouble connecting right now. Please try again.";

/// Everything a transport needs to run one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Sequence number of this submission within the session
    pub id: u64,
    /// Transcript up to and including the new user turn
    pub prior_turns: Vec<Turn>,
    pub message: String,
}

/// Progress of a submission, tagged with its id
#[derive(Debug)]
pub enum ChatEvent {
    Fragment { id: u64, text: String },
    Completed { id: u64 },
    Failed { id: u64, error: ServiceError },
}

impl ChatEvent {
    pub fn id(&self) -> u64 {
        match self {
            ChatEvent::Fragment { id, .. }
            | ChatEvent::Completed { id }
            | ChatEvent::Failed { id, .. } => *id,
        }
    }
}

#[derive(Debug, Default)]
pub struct ChatSession {
    transcript: Vec<Turn>,
    status: SessionStatus,
    input: String,
    accumulator: String,
    last_id: u64,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_awaiting(&self) -> bool {
        self.status == SessionStatus::AwaitingResponse
    }

    /// Id of the most recent submission (0 before the first one)
    pub fn current_id(&self) -> u64 {
        self.last_id
    }

    /// The in-flight model turn, if a response is streaming
    pub fn placeholder(&self) -> Option<&Turn> {
        if self.is_awaiting() {
            self.transcript.last()
        } else {
            None
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Start a new exchange.
    ///
    /// Returns `None` without touching any state when the text is blank or a
    /// response is still streaming.
    pub fn submit(&mut self, user_text: &str) -> Option<Submission> {
        if user_text.trim().is_empty() {
            return None;
        }
        if self.is_awaiting() {
            debug!("submission rejected while awaiting response");
            return None;
        }

        self.transcript.push(Turn::user(user_text));
        let prior_turns = self.transcript.clone();
        self.transcript.push(Turn::model(""));

        self.status = SessionStatus::AwaitingResponse;
        self.input.clear();
        self.accumulator.clear();
        self.last_id += 1;

        debug!(id = self.last_id, turns = prior_turns.len(), "chat submission");

        Some(Submission {
            id: self.last_id,
            prior_turns,
            message: user_text.to_string(),
        })
    }

    /// Submit whatever is in the input buffer
    pub fn submit_input(&mut self) -> Option<Submission> {
        let text = self.input.clone();
        self.submit(&text)
    }

    pub fn on_fragment(&mut self, fragment: &str) {
        if !self.is_awaiting() {
            warn!("fragment arrived with no response in flight");
            return;
        }
        self.accumulator.push_str(fragment);
        if let Some(turn) = placeholder_mut(&mut self.transcript) {
            turn.text.clone_from(&self.accumulator);
        }
    }

    pub fn on_complete(&mut self) {
        if !self.is_awaiting() {
            warn!("completion arrived with no response in flight");
            return;
        }
        debug!(id = self.last_id, chars = self.accumulator.len(), "chat response complete");
        self.accumulator.clear();
        self.status = SessionStatus::Idle;
    }

    pub fn on_error(&mut self, error: &ServiceError) {
        if !self.is_awaiting() {
            warn!(%error, "error arrived with no response in flight");
            return;
        }
        warn!(id = self.last_id, %error, "chat stream failed");
        if let Some(turn) = placeholder_mut(&mut self.transcript) {
            turn.text = APOLOGY_TEXT.to_string();
        }
        self.accumulator.clear();
        self.status = SessionStatus::Idle;
    }

    /// Apply an event from a transport task, dropping events for any
    /// submission other than the current one.
    pub fn apply(&mut self, event: ChatEvent) {
        if event.id() != self.last_id {
            warn!(event_id = event.id(), current = self.last_id, "dropping stale chat event");
            return;
        }
        match event {
            ChatEvent::Fragment { text, .. } => self.on_fragment(&text),
            ChatEvent::Completed { .. } => self.on_complete(),
            ChatEvent::Failed { error, .. } => self.on_error(&error),
        }
    }
}

fn placeholder_mut(transcript: &mut [Turn]) -> Option<&mut Turn> {
    transcript.last_mut().filter(|turn| turn.role == Role::Model)
}
