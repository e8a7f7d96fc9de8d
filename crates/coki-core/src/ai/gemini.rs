//! Gemini Generative Language API client.
//!
//! Chat streams from `streamGenerateContent?alt=sse`; search and image
//! generation use the unary `generateContent` endpoint. The key travels in
//! the `x-goog-api-key` header.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChatTransport, ImageGenerator, WebSearch};
use crate::config::{Config, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_IMAGE_MODEL, DEFAULT_SEARCH_MODEL};
use crate::error::ServiceError;
use crate::image::{GeneratedImage, ImageSize};
use crate::search::{dedupe_links, SearchLink, SearchOutcome, NO_SUMMARY_TEXT};
use crate::state::{Role, Turn};

/// Model used for each capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Models {
    pub chat: String,
    pub search: String,
    pub image: String,
}

impl Default for Models {
    fn default() -> Self {
        Self {
            chat: DEFAULT_CHAT_MODEL.to_string(),
            search: DEFAULT_SEARCH_MODEL.to_string(),
            image: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }
}

impl Models {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chat: config.chat_model.clone(),
            search: config.search_model.clone(),
            image: config.image_model.clone(),
        }
    }
}

// Request types

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

impl Content {
    fn from_turn(turn: &Turn) -> Self {
        Self::text(Some(turn.role.as_str()), &turn.text)
    }

    fn text(role: Option<&'static str>, text: &str) -> Self {
        Self {
            role,
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    image_size: &'static str,
    aspect_ratio: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    image_config: ImageConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

// Response types

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default = "default_mime_type")]
    mime_type: String,
    data: String,
}

fn default_mime_type() -> String {
    "image/png".to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|content| content.parts.iter())
    }

    /// Visible answer text of the first candidate (thought parts skipped)
    fn text(&self) -> String {
        self.parts()
            .filter(|part| !part.thought)
            .filter_map(|part| part.text.as_deref())
            .collect()
    }

    fn links(&self) -> Vec<SearchLink> {
        let chunks = self
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|meta| meta.grounding_chunks.as_slice())
            .unwrap_or_default();

        let links = chunks
            .iter()
            .filter_map(|chunk| chunk.web.as_ref())
            .filter_map(|web| match (&web.uri, &web.title) {
                (Some(uri), Some(title)) if !uri.is_empty() && !title.is_empty() => {
                    Some(SearchLink::new(title.clone(), uri.clone()))
                }
                _ => None,
            })
            .collect();

        dedupe_links(links)
    }
}

impl ApiError {
    fn into_service_error(self) -> ServiceError {
        ServiceError::from_status(self.code.unwrap_or(500), self.message)
    }
}

/// Splits a server-sent event byte stream into `data:` payloads.
///
/// Network chunks can end anywhere, including inside a UTF-8 sequence, so
/// bytes are buffered until a full line is available.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.process_line(line.trim_end_matches(['\n', '\r']), &mut payloads);
        }

        payloads
    }

    /// Flush whatever is left once the byte stream has ended
    fn finish(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            self.process_line(line.trim_end_matches('\r'), &mut payloads);
        }
        self.dispatch(&mut payloads);
        payloads
    }

    fn process_line(&mut self, line: &str, payloads: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(payloads);
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // event:, id:, retry: and comments carry nothing we use
    }

    fn dispatch(&mut self, payloads: &mut Vec<String>) {
        if !self.data.is_empty() {
            payloads.push(self.data.join("\n"));
            self.data.clear();
        }
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    models: Models,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            models: Models::default(),
        }
    }

    pub fn from_config(config: &Config, api_key: &str) -> Self {
        Self::new(api_key)
            .with_base_url(&config.base_url)
            .with_models(Models::from_config(config))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_models(mut self, models: Models) -> Self {
        self.models = models;
        self
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    async fn post(&self, url: &str, request: &GenerateRequest) -> Result<Response, ServiceError> {
        if self.api_key.trim().is_empty() {
            return Err(ServiceError::MissingApiKey);
        }

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            warn!(status, %message, "Gemini request rejected");
            return Err(ServiceError::from_status(status, message));
        }

        Ok(response)
    }

    async fn generate_content(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse, ServiceError> {
        let url = self.endpoint(model, "generateContent");
        let response = self.post(&url, request).await?;
        let mut body: GenerateResponse = response.json().await?;
        if let Some(error) = body.error.take() {
            return Err(error.into_service_error());
        }
        Ok(body)
    }
}

/// Build the `contents` array, appending `message` unless the transcript
/// already ends with it as a user turn.
fn chat_contents(prior_turns: &[Turn], message: &str) -> Vec<Content> {
    let mut contents: Vec<Content> = prior_turns.iter().map(Content::from_turn).collect();

    let already_included = prior_turns
        .last()
        .map(|turn| turn.role == Role::User && turn.text == message)
        .unwrap_or(false);
    if !already_included {
        contents.push(Content::text(Some(Role::User.as_str()), message));
    }

    contents
}

/// Decode one SSE payload and forward its text
fn handle_payload(payload: &str, on_fragment: &mut (dyn for<'a> FnMut(&'a str) + Send)) -> Result<(), ServiceError> {
    if payload.trim() == "[DONE]" {
        return Ok(());
    }

    let mut chunk: GenerateResponse = serde_json::from_str(payload)
        .map_err(|e| ServiceError::Stream(format!("invalid chunk: {}", e)))?;
    if let Some(error) = chunk.error.take() {
        return Err(error.into_service_error());
    }

    let text = chunk.text();
    if !text.is_empty() {
        on_fragment(&text);
    }
    Ok(())
}

#[async_trait]
impl ChatTransport for GeminiClient {
    async fn send(
        &self,
        prior_turns: &[Turn],
        message: &str,
        on_fragment: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<(), ServiceError> {
        let request = GenerateRequest {
            contents: chat_contents(prior_turns, message),
            tools: None,
            generation_config: None,
        };

        let url = format!("{}?alt=sse", self.endpoint(&self.models.chat, "streamGenerateContent"));
        debug!(model = %self.models.chat, turns = request.contents.len(), "sending Gemini chat request");

        let response = self.post(&url, &request).await?;
        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::default();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            for payload in decoder.push(&chunk) {
                handle_payload(&payload, on_fragment)?;
            }
        }
        for payload in decoder.finish() {
            handle_payload(&payload, on_fragment)?;
        }

        debug!("Gemini chat stream ended");
        Ok(())
    }
}

#[async_trait]
impl WebSearch for GeminiClient {
    async fn search(&self, query: &str) -> Result<SearchOutcome, ServiceError> {
        let request = GenerateRequest {
            contents: vec![Content::text(None, query)],
            tools: Some(vec![Tool {
                google_search: GoogleSearch {},
            }]),
            generation_config: None,
        };

        debug!(model = %self.models.search, "sending Gemini search request");
        let response = self.generate_content(&self.models.search, &request).await?;

        let summary = response.text();
        let summary = if summary.trim().is_empty() {
            NO_SUMMARY_TEXT.to_string()
        } else {
            summary
        };
        let links = response.links();
        debug!(links = links.len(), "Gemini search answered");

        Ok(SearchOutcome { summary, links })
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, size: ImageSize) -> Result<GeneratedImage, ServiceError> {
        let request = GenerateRequest {
            contents: vec![Content::text(Some(Role::User.as_str()), prompt)],
            tools: None,
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
                image_config: ImageConfig {
                    image_size: size.as_str(),
                    aspect_ratio: "1:1",
                },
            }),
        };

        debug!(model = %self.models.image, size = size.as_str(), "sending Gemini image request");
        let response = self.generate_content(&self.models.image, &request).await?;

        let inline = response
            .parts()
            .find_map(|part| part.inline_data.as_ref())
            .ok_or(ServiceError::NoImageData)?;
        let data = STANDARD
            .decode(inline.data.trim())
            .map_err(|e| ServiceError::Stream(format!("invalid image payload: {}", e)))?;

        Ok(GeneratedImage {
            mime_type: inline.mime_type.clone(),
            data,
        })
    }
}
