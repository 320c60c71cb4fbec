//! Built-in Whisper models (single GGML files)

use super::types::{EngineKind, ModelDescriptor};

struct BuiltIn {
    id: &'static str,
    name: &'static str,
    file: &'static str,
    description: &'static str,
    size_mb: u64,
    accuracy: u8,
}

const BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

const MODELS: &[BuiltIn] = &[
    BuiltIn {
        id: "tiny",
        name: "Whisper Tiny",
        file: "ggml-tiny.bin",
        description: "~75 MB - Fastest, lower quality",
        size_mb: 75,
        accuracy: 3,
    },
    BuiltIn {
        id: "base",
        name: "Whisper Base",
        file: "ggml-base.bin",
        description: "~142 MB - Fast, decent quality",
        size_mb: 142,
        accuracy: 4,
    },
    BuiltIn {
        id: "small",
        name: "Whisper Small",
        file: "ggml-small.bin",
        description: "~466 MB - Balanced (recommended)",
        size_mb: 466,
        accuracy: 6,
    },
    BuiltIn {
        id: "medium",
        name: "Whisper Medium",
        file: "ggml-medium-q4_1.bin",
        description: "~490 MB - Better quality, slower",
        size_mb: 491,
        accuracy: 7,
    },
    BuiltIn {
        id: "turbo",
        name: "Whisper Turbo",
        file: "ggml-large-v3-turbo.bin",
        description: "~1.6 GB - Large-v3 quality at medium speed",
        size_mb: 1600,
        accuracy: 8,
    },
    BuiltIn {
        id: "large",
        name: "Whisper Large",
        file: "ggml-large-v3-q5_0.bin",
        description: "~1.1 GB - Best quality, slowest",
        size_mb: 1080,
        accuracy: 9,
    },
];

/// Default model for whisper
pub const DEFAULT_MODEL: &str = "small";

/// Preferred model when switching to Whisper for translation
pub const TRANSLATION_MODEL: &str = "turbo";

pub fn descriptors() -> Vec<ModelDescriptor> {
    MODELS
        .iter()
        .map(|m| ModelDescriptor {
            id: m.id.to_string(),
            display_name: m.name.to_string(),
            description: m.description.to_string(),
            asset_filename: m.file.to_string(),
            is_archive: false,
            engine: EngineKind::Whisper,
            url: format!("{BASE_URL}/{}", m.file),
            size_mb: Some(m.size_mb),
            accuracy: m.accuracy,
            is_custom: false,
        })
        .collect()
}
