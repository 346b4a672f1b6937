//! Studio configuration read from the environment.

use crate::error::{CoverGenError, Result};
use crate::image::{AspectRatio, ImageSize};

#[cfg(feature = "gemini")]
use crate::image::providers::GeminiModel;

/// Environment variables searched for an API key, in order.
pub const API_KEY_ENV_VARS: [&str; 3] = ["GOOGLE_API_KEY", "GEMINI_API_KEY", "API_KEY"];

/// Model selection variable (`pro` or `flash`).
pub const MODEL_ENV_VAR: &str = "COVERGEN_MODEL";

/// Output resolution variable (`1K`, `2K` or `4K`).
pub const IMAGE_SIZE_ENV_VAR: &str = "COVERGEN_IMAGE_SIZE";

/// Initially selected aspect ratio variable (e.g. `16:9`).
pub const ASPECT_RATIO_ENV_VAR: &str = "COVERGEN_ASPECT_RATIO";

/// Returns the first non-empty API key found in the environment.
pub(crate) fn api_key_from_env() -> Option<String> {
    api_key_from_lookup(&|key: &str| std::env::var(key).ok())
}

fn api_key_from_lookup<F>(lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|var| lookup(*var))
        .find(|value| !value.trim().is_empty())
}

/// Settings for a cover studio session.
#[derive(Debug, Clone, Default)]
pub struct StudioConfig {
    /// API key, if one is configured.
    pub api_key: Option<String>,
    /// Gemini model used for generation and edits.
    #[cfg(feature = "gemini")]
    pub model: GeminiModel,
    /// Output resolution requested for every image.
    pub image_size: ImageSize,
    /// Aspect ratio selected when the session starts.
    pub aspect_ratio: AspectRatio,
}

impl StudioConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = api_key_from_lookup(&lookup);

        let image_size = match lookup(IMAGE_SIZE_ENV_VAR) {
            Some(raw) => raw
                .parse()
                .map_err(|e| CoverGenError::Config(format!("{IMAGE_SIZE_ENV_VAR}: {e}")))?,
            None => ImageSize::default(),
        };

        let aspect_ratio = match lookup(ASPECT_RATIO_ENV_VAR) {
            Some(raw) => raw
                .parse()
                .map_err(|e| CoverGenError::Config(format!("{ASPECT_RATIO_ENV_VAR}: {e}")))?,
            None => AspectRatio::default(),
        };

        #[cfg(feature = "gemini")]
        let model = match lookup(MODEL_ENV_VAR) {
            Some(raw) => raw.parse()?,
            None => GeminiModel::default(),
        };

        Ok(Self {
            api_key,
            #[cfg(feature = "gemini")]
            model,
            image_size,
            aspect_ratio,
        })
    }

    /// Builds the Gemini provider described by this configuration.
    #[cfg(feature = "gemini")]
    pub fn gemini_provider(&self) -> Result<crate::image::providers::GeminiProvider> {
        let mut builder = crate::image::providers::GeminiProvider::builder().model(self.model);
        if let Some(ref key) = self.api_key {
            builder = builder.api_key(key.clone());
        }
        builder.build()
    }
}
