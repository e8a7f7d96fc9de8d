use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use coki_core::speech::SPEECH_UNSUPPORTED_TEXT;
use coki_core::{
    dispatch, resolve_api_key, AppMode, ChatEvent, ChatSession, ChatTransport, Config, Dictation,
    GeminiClient, GeneratedImage, ImageGenerator, ImageSize, KeySelector, KeySource, ResolvedKey,
    SearchHistory, SearchLink, SearchOutcome, ServiceError, SpeechError, SpeechInput,
    UnsupportedSpeech, WebSearch,
};
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::tui::AppEvent;

pub const SEARCH_ERROR_TEXT: &str = "An error occurred while searching. Please try again.";
pub const IMAGE_ERROR_TEXT: &str = "Failed to generate image. Please try again.";
pub const IMAGE_AUTH_ERROR_TEXT: &str =
    "Authorization failed. Please select a valid project/key and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// The three remote capabilities, behind trait objects so background tasks
/// can share them.
#[derive(Clone)]
pub struct Services {
    pub chat: Arc<dyn ChatTransport>,
    pub search: Arc<dyn WebSearch>,
    pub images: Arc<dyn ImageGenerator>,
}

impl Services {
    /// All three modes backed by one Gemini client
    pub fn gemini(config: &Config, api_key: &str) -> Self {
        let client = Arc::new(GeminiClient::from_config(config, api_key));
        Self {
            chat: client.clone(),
            search: client.clone(),
            images: client,
        }
    }
}

/// Builds fresh services once a new key has been entered
pub type ServiceFactory = Box<dyn Fn(&Config, &str) -> Services + Send>;

#[derive(Default)]
pub struct SearchState {
    pub query: String,
    pub cursor: usize,
    pub summary: String,
    pub results: Vec<SearchLink>,
    pub is_loading: bool,
    pub has_searched: bool,
    pub results_state: ListState,
    pub history_state: ListState,
    pub summary_scroll: u16,
    pub request_id: u64,
}

#[derive(Default)]
pub struct ImageState {
    pub prompt: String,
    pub cursor: usize,
    pub size: ImageSize,
    pub is_loading: bool,
    pub error: Option<String>,
    pub saved_path: Option<PathBuf>,
    /// Generation waiting for the key prompt to be answered
    pub parked: bool,
    pub request_id: u64,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub mode: AppMode,
    pub input_mode: InputMode,

    pub search: SearchState,
    pub history: SearchHistory,
    pub image: ImageState,

    // Chat state
    pub chat: ChatSession,
    pub chat_cursor: usize,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub follow_chat: bool,

    // Animation state for "Thinking..." indicator
    pub animation_frame: usize,

    /// One-line message shown in the footer until the next key press
    pub notice: Option<String>,

    // API key input popup
    pub show_api_key_input: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,
    pub key_source: Option<KeySource>,

    pub dictation: Option<Dictation>,

    pub config: Config,
    config_path: Option<PathBuf>,
    services: Services,
    make_services: ServiceFactory,
    speech: Box<dyn SpeechInput>,
    events: UnboundedSender<AppEvent>,
}

impl App {
    /// Backed by Gemini; `key` falls back to env vars and then the config file
    pub fn new(
        config: Config,
        history: SearchHistory,
        events: UnboundedSender<AppEvent>,
        key: Option<ResolvedKey>,
    ) -> Self {
        let key = key.or_else(|| resolve_api_key(&config));
        Self::with_services(config, history, events, key, Box::new(Services::gemini))
    }

    pub fn with_services(
        config: Config,
        history: SearchHistory,
        events: UnboundedSender<AppEvent>,
        key: Option<ResolvedKey>,
        make_services: ServiceFactory,
    ) -> Self {
        let api_key = key.as_ref().map(|k| k.key.as_str()).unwrap_or("");
        let services = make_services(&config, api_key);
        let key_source = key.map(|k| k.source);
        match key_source {
            Some(source) => info!(source = source.as_str(), "API key resolved"),
            None => info!("no API key configured"),
        }

        let mut search = SearchState::default();
        if !history.is_empty() {
            search.history_state.select(Some(0));
        }

        let image = ImageState {
            size: config.image_size,
            ..ImageState::default()
        };

        Self {
            should_quit: false,
            mode: config.start_mode,
            input_mode: InputMode::Normal,

            search,
            history,
            image,

            chat: ChatSession::new(),
            chat_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_chat: true,

            animation_frame: 0,
            notice: None,

            show_api_key_input: false,
            api_key_input: String::new(),
            api_key_input_cursor: 0,
            key_source,

            dictation: None,

            config,
            config_path: None,
            services,
            make_services,
            speech: Box::new(UnsupportedSpeech),
            events,
        }
    }

    /// Persist config changes (the API key) to this file
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn set_mode(&mut self, mode: AppMode) {
        if self.mode == mode {
            return;
        }
        debug!(from = self.mode.as_str(), to = mode.as_str(), "switching mode");
        // Leaving the screen ends any dictation it started
        self.dictation = None;
        self.mode = mode;
        self.input_mode = InputMode::Normal;
    }

    pub fn is_busy(&self) -> bool {
        self.search.is_loading || self.image.is_loading || self.chat.is_awaiting()
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Search

    pub fn perform_search(&mut self) {
        let query = self.search.query.trim().to_string();
        if query.is_empty() || self.search.is_loading {
            return;
        }

        self.history.insert(&query);
        if let Err(e) = self.history.save() {
            warn!(error = %e, "failed to save search history");
        }
        self.search.history_state.select(Some(0));

        self.search.is_loading = true;
        self.search.has_searched = true;
        self.search.results.clear();
        self.search.summary.clear();
        self.search.results_state.select(None);
        self.search.summary_scroll = 0;
        self.search.request_id += 1;

        let id = self.search.request_id;
        let search = self.services.search.clone();
        let tx = self.events.clone();
        debug!(id, query = %query, "starting search");
        tokio::spawn(async move {
            let result = search.search(&query).await;
            let _ = tx.send(AppEvent::SearchFinished { id, result });
        });
    }

    pub fn finish_search(&mut self, id: u64, result: Result<SearchOutcome, ServiceError>) {
        if id != self.search.request_id {
            debug!(id, current = self.search.request_id, "dropping stale search result");
            return;
        }
        self.search.is_loading = false;

        match result {
            Ok(outcome) => {
                self.search.summary = outcome.summary;
                self.search.results = outcome.links;
                if !self.search.results.is_empty() {
                    self.search.results_state.select(Some(0));
                }
            }
            Err(e) => {
                warn!(error = %e, "search failed");
                if matches!(e, ServiceError::MissingApiKey) {
                    self.notice = Some("No API key set. Press K to enter one.".to_string());
                }
                self.search.summary = SEARCH_ERROR_TEXT.to_string();
            }
        }
    }

    /// Load a history entry into the query box and run it
    pub fn run_history_entry(&mut self) {
        let Some(query) = self
            .search
            .history_state
            .selected()
            .and_then(|i| self.history.entries().get(i))
            .cloned()
        else {
            return;
        };
        self.search.cursor = query.chars().count();
        self.search.query = query;
        self.perform_search();
    }

    /// Go back to the landing view with the history list
    pub fn clear_search(&mut self) {
        if self.search.is_loading {
            return;
        }
        self.search.has_searched = false;
        self.search.summary.clear();
        self.search.results.clear();
        self.search.results_state.select(None);
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        if let Err(e) = self.history.save() {
            warn!(error = %e, "failed to save search history");
        }
        self.search.history_state.select(None);
    }

    pub fn search_nav_down(&mut self) {
        let (state, len) = self.search_list();
        if len > 0 {
            let i = state.selected().map(|i| (i + 1).min(len - 1)).unwrap_or(0);
            state.select(Some(i));
        }
    }

    pub fn search_nav_up(&mut self) {
        let (state, _) = self.search_list();
        if let Some(i) = state.selected() {
            state.select(Some(i.saturating_sub(1)));
        }
    }

    /// Whichever list the search screen is showing
    fn search_list(&mut self) -> (&mut ListState, usize) {
        if self.search.has_searched {
            (&mut self.search.results_state, self.search.results.len())
        } else {
            (&mut self.search.history_state, self.history.entries().len())
        }
    }

    pub fn selected_result(&self) -> Option<&SearchLink> {
        self.search
            .results_state
            .selected()
            .and_then(|i| self.search.results.get(i))
    }

    /// Start dictation, or finish a running one into the query box
    pub fn toggle_voice_input(&mut self) {
        if let Some(dictation) = self.dictation.take() {
            let text = dictation.finish();
            let text = text.trim();
            if !text.is_empty() {
                self.search.query = text.to_string();
                self.search.cursor = self.search.query.chars().count();
            }
            return;
        }

        match self.speech.listen() {
            Ok(dictation) => {
                self.dictation = Some(dictation);
                self.notice = Some("Listening... press v again to stop.".to_string());
            }
            Err(SpeechError::Unsupported) => {
                self.notice = Some(SPEECH_UNSUPPORTED_TEXT.to_string());
            }
        }
    }

    // Image

    pub fn cycle_image_size(&mut self, forward: bool) {
        if self.image.is_loading {
            return;
        }
        self.image.size = if forward {
            self.image.size.next()
        } else {
            self.image.size.prev()
        };
    }

    pub fn generate_image(&mut self) {
        if self.image.prompt.trim().is_empty() || self.image.is_loading {
            return;
        }
        self.image.error = None;

        if !self.has_selected_key() {
            debug!("parking image request until a key is entered");
            self.image.parked = true;
            self.open_select_key();
            return;
        }
        self.start_image_request();
    }

    fn start_image_request(&mut self) {
        self.image.parked = false;
        self.image.is_loading = true;
        self.image.request_id += 1;

        let id = self.image.request_id;
        let prompt = self.image.prompt.trim().to_string();
        let size = self.image.size;
        let images = self.services.images.clone();
        let tx = self.events.clone();
        debug!(id, size = size.as_str(), "starting image generation");
        tokio::spawn(async move {
            let result = images.generate(&prompt, size).await;
            let _ = tx.send(AppEvent::ImageFinished { id, result });
        });
    }

    pub fn finish_image(&mut self, id: u64, result: Result<GeneratedImage, ServiceError>) {
        if id != self.image.request_id {
            debug!(id, current = self.image.request_id, "dropping stale image result");
            return;
        }
        self.image.is_loading = false;

        match result {
            Ok(image) => match save_image(&image, &self.config.resolved_image_dir()) {
                Ok(path) => {
                    info!(path = %path.display(), bytes = image.data.len(), "image saved");
                    self.image.saved_path = Some(path);
                }
                Err(e) => {
                    warn!(error = %e, "failed to save image");
                    self.image.error = Some(format!("Image generated but could not be saved: {e}"));
                }
            },
            Err(e) if e.is_authorization() => {
                warn!(error = %e, "image generation unauthorized");
                self.open_select_key();
                self.image.error = Some(IMAGE_AUTH_ERROR_TEXT.to_string());
            }
            Err(e) => {
                warn!(error = %e, "image generation failed");
                self.image.error = Some(IMAGE_ERROR_TEXT.to_string());
            }
        }
    }

    // Chat

    pub fn submit_chat(&mut self) {
        let Some(submission) = self.chat.submit_input() else {
            return;
        };
        self.chat_cursor = 0;
        self.follow_chat = true;
        self.scroll_chat_to_bottom();

        let transport = self.services.chat.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            dispatch(transport.as_ref(), submission, |event| {
                let _ = tx.send(AppEvent::Chat(event));
            })
            .await;
        });
    }

    pub fn apply_chat_event(&mut self, event: ChatEvent) {
        self.chat.apply(event);
        if self.follow_chat {
            self.scroll_chat_to_bottom();
        }
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.follow_chat = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        let max = self.chat_lines().saturating_sub(self.visible_chat_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
        if self.chat_scroll == max {
            self.follow_chat = true;
        }
    }

    /// Scroll chat to bottom so the newest text is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        self.follow_chat = true;
        let total_lines = self.chat_lines();
        let visible_height = self.visible_chat_height();
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    fn visible_chat_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Rendered height of the transcript at the current wrap width
    fn chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: usize = 0;
        for turn in self.chat.transcript() {
            total_lines += 1; // Role line ("You:" or "Coki:")
            if turn.text.is_empty() {
                total_lines += 1; // "Thinking..."
            }
            for line in turn.text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines += char_count / wrap_width + 1;
            }
            total_lines += 1; // Blank line after message
        }
        u16::try_from(total_lines).unwrap_or(u16::MAX)
    }

    // API key popup

    pub fn save_api_key(&mut self) {
        let key = self.api_key_input.trim().to_string();
        self.close_api_key_input();
        if key.is_empty() {
            self.image.parked = false;
            return;
        }

        self.config.api_key = Some(key.clone());
        let source = match self.persist_config() {
            Ok(true) => KeySource::Config,
            Ok(false) => KeySource::Prompt,
            Err(e) => {
                warn!(error = %e, "failed to save config");
                self.notice = Some(format!("Key set for this session only: {e}"));
                KeySource::Prompt
            }
        };
        info!(source = source.as_str(), "API key updated");
        self.key_source = Some(source);
        self.services = (self.make_services)(&self.config, &key);

        if self.image.parked {
            self.image.error = None;
            self.start_image_request();
        }
    }

    pub fn cancel_api_key_input(&mut self) {
        self.close_api_key_input();
        self.image.parked = false;
    }

    fn close_api_key_input(&mut self) {
        self.show_api_key_input = false;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
    }

    /// Write the config file; `Ok(false)` when running without one
    fn persist_config(&self) -> Result<bool> {
        let Some(path) = &self.config_path else {
            return Ok(false);
        };
        self.config.save_to(path)?;
        Ok(true)
    }
}

impl KeySelector for App {
    fn has_selected_key(&self) -> bool {
        self.key_source.is_some()
    }

    fn open_select_key(&mut self) {
        self.show_api_key_input = true;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
    }
}

/// Write `image` as `coki-generated-<unix millis>.<ext>` under `dir`
pub fn save_image(image: &GeneratedImage, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let file_name = format!(
        "coki-generated-{}.{}",
        chrono::Utc::now().timestamp_millis(),
        image.extension()
    );
    let path = dir.join(file_name);
    fs::write(&path, &image.data)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
