//! Built-in Parakeet models (ONNX directories shipped as tar.gz)

use super::types::{EngineKind, ModelDescriptor};

pub const DEFAULT_MODEL: &str = "parakeet-v3";

pub fn descriptors() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor {
            id: "parakeet-v2".to_string(),
            display_name: "Parakeet V2".to_string(),
            description: "~470 MB - English only, fast on CPU".to_string(),
            asset_filename: "parakeet-v2-int8.tar.gz".to_string(),
            is_archive: true,
            engine: EngineKind::Parakeet,
            url: "https://blob.handy.computer/parakeet-v2-int8.tar.gz".to_string(),
            size_mb: Some(473),
            accuracy: 8,
            is_custom: false,
        },
        ModelDescriptor {
            id: DEFAULT_MODEL.to_string(),
            display_name: "Parakeet V3".to_string(),
            description: "~480 MB - 25 European languages, fast on CPU".to_string(),
            asset_filename: "parakeet-v3-int8.tar.gz".to_string(),
            is_archive: true,
            engine: EngineKind::Parakeet,
            url: "https://blob.handy.computer/parakeet-v3-int8.tar.gz".to_string(),
            size_mb: Some(478),
            accuracy: 8,
            is_custom: false,
        },
    ]
}
