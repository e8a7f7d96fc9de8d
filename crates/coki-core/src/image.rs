use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Output resolution of a generated image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageSize {
    pub fn all() -> [ImageSize; 3] {
        [ImageSize::OneK, ImageSize::TwoK, ImageSize::FourK]
    }

    /// Size tag as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "1K" => Some(ImageSize::OneK),
            "2K" => Some(ImageSize::TwoK),
            "4K" => Some(ImageSize::FourK),
            _ => None,
        }
    }

    pub fn next(&self) -> Self {
        match self {
            ImageSize::OneK => ImageSize::TwoK,
            ImageSize::TwoK => ImageSize::FourK,
            ImageSize::FourK => ImageSize::OneK,
        }
    }

    pub fn prev(&self) -> Self {
        match self {
            ImageSize::OneK => ImageSize::FourK,
            ImageSize::TwoK => ImageSize::OneK,
            ImageSize::FourK => ImageSize::TwoK,
        }
    }
}

/// A single decoded image payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl GeneratedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }

    /// File extension matching the mime type
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}
