//! Scripted image provider for tests.

use crate::error::{CoverGenError, Result};
use crate::image::{
    EditRequest, GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat,
    ImageProvider, ImageProviderKind,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

/// A PNG-looking image whose last byte is `tag`.
pub(crate) fn png_image(tag: u8) -> GeneratedImage {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0];
    data.push(tag);
    GeneratedImage::new(
        data,
        ImageFormat::Png,
        ImageProviderKind::Custom,
        GenerationMetadata::default(),
    )
}

/// Returns the tag byte of an image made by [`png_image`].
pub(crate) fn tag_of(data: &[u8]) -> u8 {
    data[data.len() - 1]
}

/// What a scripted call returns.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Image(u8),
    Auth,
    Blocked,
    ServerError,
    Panic,
}

impl Reply {
    fn into_result(self) -> Result<GeneratedImage> {
        match self {
            Self::Image(tag) => Ok(png_image(tag)),
            Self::Auth => Err(CoverGenError::Auth("API key not valid".into())),
            Self::Blocked => Err(CoverGenError::ContentBlocked("safety".into())),
            Self::ServerError => Err(CoverGenError::Api {
                status: 500,
                message: "internal".into(),
            }),
            Self::Panic => panic!("scripted provider panic"),
        }
    }
}

#[derive(Debug, Clone)]
struct Step {
    delay: Duration,
    reply: Reply,
}

/// Provider whose answers are scripted per request.
///
/// Generation replies are keyed by request variation; unscripted
/// variations answer immediately with an image tagged by the variation.
/// Edit replies are consumed in order, defaulting to an image tagged 200.
#[derive(Debug, Default)]
pub(crate) struct ScriptedProvider {
    generate_steps: Mutex<HashMap<u32, Step>>,
    edit_steps: Mutex<VecDeque<Step>>,
    generate_gate: Option<Semaphore>,
    edit_gate: Option<Semaphore>,
    generate_calls: AtomicUsize,
    edit_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    edits: Mutex<Vec<EditRequest>>,
    completed: Mutex<Vec<u32>>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Generation calls wait for [`release_generations`](Self::release_generations).
    pub(crate) fn hold_generations(mut self) -> Self {
        self.generate_gate = Some(Semaphore::new(0));
        self
    }

    /// Edit calls wait for [`release_edits`](Self::release_edits).
    pub(crate) fn hold_edits(mut self) -> Self {
        self.edit_gate = Some(Semaphore::new(0));
        self
    }

    pub(crate) fn on_generate(self, variation: u32, delay_ms: u64, reply: Reply) -> Self {
        self.generate_steps.lock().unwrap().insert(
            variation,
            Step {
                delay: Duration::from_millis(delay_ms),
                reply,
            },
        );
        self
    }

    pub(crate) fn on_edit(self, reply: Reply) -> Self {
        self.edit_steps.lock().unwrap().push_back(Step {
            delay: Duration::ZERO,
            reply,
        });
        self
    }

    pub(crate) fn release_generations(&self, permits: usize) {
        if let Some(ref gate) = self.generate_gate {
            gate.add_permits(permits);
        }
    }

    pub(crate) fn release_edits(&self, permits: usize) {
        if let Some(ref gate) = self.edit_gate {
            gate.add_permits(permits);
        }
    }

    pub(crate) fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn edit_calls(&self) -> usize {
        self.edit_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn edits(&self) -> Vec<EditRequest> {
        self.edits.lock().unwrap().clone()
    }

    /// Variations in the order their replies were delivered.
    pub(crate) fn completion_order(&self) -> Vec<u32> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageProvider for ScriptedProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        let step = self
            .generate_steps
            .lock()
            .unwrap()
            .get(&request.variation)
            .cloned()
            .unwrap_or(Step {
                delay: Duration::ZERO,
                reply: Reply::Image(request.variation as u8),
            });

        if let Some(ref gate) = self.generate_gate {
            gate.acquire().await.unwrap().forget();
        }
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        self.completed.lock().unwrap().push(request.variation);
        step.reply.into_result()
    }

    async fn edit(&self, request: &EditRequest) -> Result<GeneratedImage> {
        self.edit_calls.fetch_add(1, Ordering::SeqCst);
        self.edits.lock().unwrap().push(request.clone());

        let step = self.edit_steps.lock().unwrap().pop_front().unwrap_or(Step {
            delay: Duration::ZERO,
            reply: Reply::Image(200),
        });

        if let Some(ref gate) = self.edit_gate {
            gate.acquire().await.unwrap().forget();
        }
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        step.reply.into_result()
    }

    fn kind(&self) -> ImageProviderKind {
        ImageProviderKind::Custom
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
