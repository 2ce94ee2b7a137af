//! Renderer configuration
//!
//! TOML-backed settings with typed defaults. Applications load a settings
//! file at startup or construct settings in code with the builder methods;
//! either way `validate` runs before the renderer touches the device.

use crate::render::{RenderError, RenderResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Shader search paths for the built-in materials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderPaths {
    /// Directory containing compiled SPIR-V shaders.
    pub shader_dir: String,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            shader_dir: "shaders".to_string(),
        }
    }
}

/// Top-level renderer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Application name reported to the driver.
    pub application_name: String,
    /// Frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Whether to request validation layers.
    pub enable_validation: bool,
    /// Clear color applied at the start of each frame, RGBA.
    pub clear_color: [f32; 4],
    /// Shader file locations.
    pub shaders: ShaderPaths,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            application_name: "ember application".to_string(),
            frames_in_flight: 2,
            enable_validation: cfg!(debug_assertions),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shaders: ShaderPaths::default(),
        }
    }
}

impl RendererSettings {
    /// Settings with defaults and the given application name.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    /// Set the frames-in-flight count.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Set the per-frame clear color.
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the shader directory.
    pub fn with_shader_dir(mut self, dir: impl Into<String>) -> Self {
        self.shaders.shader_dir = dir.into();
        self
    }

    /// Parse settings from a TOML document.
    pub fn from_toml_str(text: &str) -> RenderResult<Self> {
        let settings: Self = toml::from_str(text)
            .map_err(|e| RenderError::InitializationFailed(format!("bad settings file: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and parse a TOML settings file.
    pub fn load<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let text = std::fs::read_to_string(&path).map_err(|e| {
            RenderError::InitializationFailed(format!(
                "failed to read settings file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the settings for values the renderer cannot operate with.
    pub fn validate(&self) -> RenderResult<()> {
        if self.application_name.is_empty() {
            return Err(RenderError::InitializationFailed(
                "application name cannot be empty".to_string(),
            ));
        }
        if self.frames_in_flight == 0 || self.frames_in_flight > 8 {
            return Err(RenderError::InitializationFailed(format!(
                "frames_in_flight must be between 1 and 8, got {}",
                self.frames_in_flight
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RendererSettings::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let settings = RendererSettings::from_toml_str(
            r#"
            application_name = "demo"
            frames_in_flight = 3
            "#,
        )
        .unwrap();
        assert_eq!(settings.application_name, "demo");
        assert_eq!(settings.frames_in_flight, 3);
        assert_eq!(settings.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(settings.shaders.shader_dir, "shaders");
    }

    #[test]
    fn nested_shader_table_parses() {
        let settings = RendererSettings::from_toml_str(
            r#"
            [shaders]
            shader_dir = "assets/spv"
            "#,
        )
        .unwrap();
        assert_eq!(settings.shaders.shader_dir, "assets/spv");
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let err = RendererSettings::from_toml_str("frames_in_flight = 0").unwrap_err();
        assert!(matches!(err, RenderError::InitializationFailed(_)));
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(RendererSettings::from_toml_str("frames_in_flight = [").is_err());
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let settings = RendererSettings::new("demo")
            .with_frames_in_flight(3)
            .with_clear_color([0.1, 0.2, 0.3, 1.0]);
        let text = toml::to_string(&settings).unwrap();
        assert_eq!(RendererSettings::from_toml_str(&text).unwrap(), settings);
    }
}
