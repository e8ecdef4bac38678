use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::geometry::ContentMode;
use crate::RendererError;

/// Color format of the drawable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TargetFormat {
    #[default]
    Bgra8Unorm,
    Rgba8Unorm,
}

impl TargetFormat {
    pub fn wgpu(self) -> wgpu::TextureFormat {
        match self {
            TargetFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TargetFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PresentModePreference {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

impl PresentModePreference {
    pub fn wgpu(self) -> wgpu::PresentMode {
        match self {
            PresentModePreference::Fifo => wgpu::PresentMode::Fifo,
            PresentModePreference::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModePreference::Immediate => wgpu::PresentMode::Immediate,
        }
    }
}

/// Sampler filtering used when the quad is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FilterMode {
    #[default]
    Linear,
    Nearest,
}

impl FilterMode {
    pub fn wgpu(self) -> wgpu::FilterMode {
        match self {
            FilterMode::Linear => wgpu::FilterMode::Linear,
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub content_mode: ContentMode,
    pub clear_color: [f64; 4],
    pub target_format: TargetFormat,
    pub present_mode: PresentModePreference,
    pub filter: FilterMode,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            content_mode: ContentMode::ScaleAspectFit,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            target_format: TargetFormat::default(),
            present_mode: PresentModePreference::default(),
            filter: FilterMode::default(),
        }
    }
}

impl RendererConfig {
    pub fn from_json_str(json: &str) -> Result<Self, RendererError> {
        serde_json::from_str(json).map_err(|e| RendererError::InvalidFormat(format!("config: {e}")))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RendererError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RendererError::InvalidFormat(format!("config {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn clear_color(&self) -> wgpu::Color {
        let [r, g, b, a] = self.clear_color;
        wgpu::Color { r, g, b, a }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = RendererConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.content_mode, ContentMode::ScaleAspectFit);
        assert_eq!(config.target_format.wgpu(), wgpu::TextureFormat::Bgra8Unorm);
    }

    #[test]
    fn fields_override_individually() {
        let config = RendererConfig::from_json_str(
            r#"{ "content_mode": "top-left", "filter": "Nearest", "clear_color": [1.0, 0.0, 0.0, 1.0] }"#,
        )
        .unwrap();
        assert_eq!(config.content_mode, ContentMode::TopLeft);
        assert_eq!(config.filter, FilterMode::Nearest);
        assert_eq!(config.clear_color().r, 1.0);
        assert_eq!(config.present_mode, PresentModePreference::Fifo);
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            RendererConfig::from_json_str("{ nope"),
            Err(RendererError::InvalidFormat(_))
        ));
    }
}
