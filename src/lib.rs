#![warn(missing_docs)]
//! CoverGen - AI cover image studio.
//!
//! Turns a short topic into three candidate cover images generated
//! concurrently, and lets each result be refined with a follow-up
//! instruction without disturbing the others.
//!
//! # Quick Start
//!
//! ```no_run
//! use covergen::studio::{BatchOutcome, Studio};
//! use covergen::{EnvCredentialGate, StudioConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> covergen::Result<()> {
//!     let config = StudioConfig::from_env()?;
//!     let studio = Studio::from_config(&config, Arc::new(EnvCredentialGate))?;
//!     studio.check_credential().await;
//!     studio.set_prompt("retro synthwave album").await;
//!
//!     if let BatchOutcome::Completed(report) = studio.generate_all().await {
//!         for slot in &report.slots {
//!             if let Some(image) = slot.image() {
//!                 image.image().save(format!("cover-{}.png", slot.id()))?;
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini` (default): Gemini image provider
//! - `cli`: Command-line interface

mod error;

pub mod config;
pub mod credential;
pub mod image;
pub mod studio;

#[cfg(test)]
mod test_support;

// Re-export error types at crate root
pub use error::{CoverGenError, FailureKind, Result};

pub use config::StudioConfig;
pub use credential::{CredentialGate, EnvCredentialGate, StaticCredentialGate};

pub use image::{
    AspectRatio, EditRequest, GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat,
    ImageProvider, ImageProviderKind, ImageSize, ReferenceImage,
};

#[cfg(feature = "gemini")]
pub use image::providers::{GeminiModel, GeminiProvider, GeminiProviderBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{CoverGenError, Result};
    pub use crate::image::{AspectRatio, GeneratedImage, ImageProvider, ReferenceImage};
    pub use crate::studio::{BatchOutcome, CardController, RefineOutcome, Studio};

    #[cfg(feature = "gemini")]
    pub use crate::image::providers::GeminiProvider;
}
