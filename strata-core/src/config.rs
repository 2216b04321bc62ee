//! Per-document tunables. Parsed from TOML by whoever owns the settings file.

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("malformed config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("full_frame_ratio must be a positive number, found {0}")]
    FullFrameRatio(f32),
    #[error("history_limit must be at least 1")]
    HistoryLimit,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Consecutive compatible operations closer together than this collapse into one undo step.
    pub merge_window_ms: u64,
    /// Pixel edits covering at least this fraction of the canvas are recorded as full frames.
    pub full_frame_ratio: f32,
    /// Oldest undo steps are forgotten beyond this many. Unbounded if absent.
    pub history_limit: Option<usize>,
    /// Keep composited groups around between renders.
    pub render_cache: bool,
}
impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            merge_window_ms: 1000,
            full_frame_ratio: 0.75,
            history_limit: None,
            render_cache: true,
        }
    }
}
impl DocumentConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.full_frame_ratio.is_nan() || self.full_frame_ratio <= 0.0 {
            return Err(ConfigError::FullFrameRatio(self.full_frame_ratio));
        }
        if self.history_limit == Some(0) {
            return Err(ConfigError::HistoryLimit);
        }
        Ok(())
    }
}
