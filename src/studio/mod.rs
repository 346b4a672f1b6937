//! The cover studio: session state, batch generation and per-result refinement.
//!
//! [`Studio`] bundles a shared [`Session`] with an image provider and a
//! credential gate. Front ends drive it with plain method calls and read the
//! session back through [`Studio::session`].
//!
//! ```no_run
//! use covergen::studio::{BatchOutcome, Studio};
//! use covergen::{EnvCredentialGate, GeminiProvider};
//! use std::sync::Arc;
//!
//! # async fn run() -> covergen::Result<()> {
//! let provider = Arc::new(GeminiProvider::builder().build()?);
//! let studio = Studio::new(provider, Arc::new(EnvCredentialGate));
//! studio.check_credential().await;
//! studio.set_prompt("neon cityscape podcast cover").await;
//!
//! if let BatchOutcome::Completed(report) = studio.generate_all().await {
//!     println!("{} of 3 covers ready", report.succeeded());
//! }
//! # Ok(())
//! # }
//! ```

pub mod card;
pub mod orchestrator;
pub mod prompt;
pub mod session;

pub use card::{CardController, CardMode, RefineOutcome};
pub use orchestrator::{BatchOrchestrator, BatchOutcome, BatchReport, SkipReason};
pub use session::{
    BatchId, BatchTicket, ResultSlot, Session, SessionHandle, SlotId, SlotImage, SlotStatus,
    BATCH_SIZE,
};

use crate::credential::CredentialGate;
use crate::error::Result;
use crate::image::{AspectRatio, ImageProvider, ImageSize, ReferenceImage};
use std::sync::Arc;

/// A generation session bound to a provider and a credential gate.
#[derive(Clone)]
pub struct Studio {
    session: SessionHandle,
    provider: Arc<dyn ImageProvider>,
    credentials: Arc<dyn CredentialGate>,
    image_size: ImageSize,
    seed: Option<u64>,
}

impl Studio {
    /// Creates a studio with an empty session.
    pub fn new(provider: Arc<dyn ImageProvider>, credentials: Arc<dyn CredentialGate>) -> Self {
        Self {
            session: SessionHandle::default(),
            provider,
            credentials,
            image_size: ImageSize::default(),
            seed: None,
        }
    }

    /// Builds a Gemini-backed studio from configuration.
    #[cfg(feature = "gemini")]
    pub fn from_config(
        config: &crate::config::StudioConfig,
        credentials: Arc<dyn CredentialGate>,
    ) -> Result<Self> {
        let provider = Arc::new(config.gemini_provider()?);
        Ok(Self::new(provider, credentials)
            .with_aspect_ratio(config.aspect_ratio)
            .with_image_size(config.image_size))
    }

    /// Selects `ratio` in the session, keeping everything else.
    pub fn with_aspect_ratio(self, ratio: AspectRatio) -> Self {
        match self.session.try_lock() {
            Some(mut session) => session.set_aspect_ratio(ratio),
            None => tracing::warn!("session busy, aspect ratio {ratio} not applied"),
        }
        self
    }

    /// Sets the output resolution for generations and refinements.
    pub fn with_image_size(mut self, size: ImageSize) -> Self {
        self.image_size = size;
        self
    }

    /// Sets a base seed for generations.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// The shared session.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// The provider used for every request.
    pub fn provider(&self) -> &dyn ImageProvider {
        self.provider.as_ref()
    }

    /// Swaps the provider used for later requests, e.g. after a new key is selected.
    pub fn set_provider(&mut self, provider: Arc<dyn ImageProvider>) {
        self.provider = provider;
    }

    /// Asks the gate whether a credential is available and records the answer.
    pub async fn check_credential(&self) -> bool {
        let available = self.credentials.has_credential().await;
        self.session.lock().await.set_credential_available(available);
        available
    }

    /// Runs the gate's selection flow, then treats the credential as available.
    pub async fn select_credential(&self) -> Result<()> {
        self.credentials.select_credential().await?;
        self.session.lock().await.set_credential_available(true);
        Ok(())
    }

    /// Replaces the prompt text.
    pub async fn set_prompt(&self, prompt: impl Into<String>) {
        self.session.lock().await.set_prompt(prompt);
    }

    /// Selects the aspect ratio for the next batch.
    pub async fn set_aspect_ratio(&self, ratio: AspectRatio) {
        self.session.lock().await.set_aspect_ratio(ratio);
    }

    /// Attaches or removes the reference image.
    pub async fn set_reference_image(&self, image: Option<ReferenceImage>) {
        self.session.lock().await.set_reference_image(image);
    }

    /// An orchestrator publishing into this studio's session.
    pub fn orchestrator(&self) -> BatchOrchestrator {
        BatchOrchestrator::new(self.session.clone(), Arc::clone(&self.provider))
            .with_image_size(self.image_size)
            .with_seed(self.seed)
    }

    /// Generates a batch of three covers from the current inputs.
    pub async fn generate_all(&self) -> BatchOutcome {
        self.orchestrator().generate_all().await
    }

    /// A card controller for `slot_id`.
    pub fn card(&self, slot_id: SlotId) -> CardController {
        CardController::new(slot_id).with_image_size(self.image_size)
    }

    /// Submits the card's draft against this studio's session and provider.
    pub async fn refine(&self, card: &mut CardController) -> RefineOutcome {
        card.submit(&self.session, self.provider.as_ref()).await
    }
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("provider", &self.provider.name())
            .field("image_size", &self.image_size)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticCredentialGate;
    use crate::test_support::{tag_of, Reply, ScriptedProvider};

    fn studio(provider: ScriptedProvider, gate: StaticCredentialGate) -> (Studio, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let studio = Studio::new(provider.clone(), Arc::new(gate));
        (studio, provider)
    }

    #[tokio::test]
    async fn test_generation_gated_on_credential() {
        let (studio, provider) = studio(ScriptedProvider::new(), StaticCredentialGate::new(false));
        studio.set_prompt("vintage jazz").await;

        assert!(!studio.check_credential().await);
        assert!(matches!(
            studio.generate_all().await,
            BatchOutcome::Skipped(SkipReason::CredentialRequired)
        ));
        assert_eq!(provider.generate_calls(), 0);

        studio.select_credential().await.unwrap();
        assert!(studio.session().snapshot().await.can_generate());
        assert!(matches!(
            studio.generate_all().await,
            BatchOutcome::Completed(_)
        ));
        assert_eq!(provider.generate_calls(), 3);
    }

    #[tokio::test]
    async fn test_generate_then_refine_one_card() {
        let (studio, provider) = studio(
            ScriptedProvider::new().on_edit(Reply::Image(77)),
            StaticCredentialGate::new(true),
        );
        let studio = studio.with_aspect_ratio(AspectRatio::Landscape);
        studio.check_credential().await;
        studio.set_prompt("mountain retreat").await;

        let BatchOutcome::Completed(report) = studio.generate_all().await else {
            panic!("batch skipped");
        };

        let target = report.slots[0].clone();
        let mut card = studio.card(target.id());
        assert!(card.open_editor(&target));
        card.set_draft("add snow");
        assert!(matches!(
            studio.refine(&mut card).await,
            RefineOutcome::Applied(_)
        ));

        let snapshot = studio.session().snapshot().await;
        let refined = &snapshot.slots()[0];
        assert_eq!(refined.source_prompt(), "mountain retreat (Adjusted: add snow)");
        assert_eq!(tag_of(refined.image().unwrap().payload()), 77);
        assert_eq!(provider.edits()[0].aspect_ratio, AspectRatio::Landscape);
        assert_eq!(snapshot.slots()[1], report.slots[1]);
    }

    #[tokio::test]
    async fn test_setters_reach_session() {
        let (studio, _provider) = studio(ScriptedProvider::new(), StaticCredentialGate::new(true));
        studio.set_prompt("a").await;
        studio.set_aspect_ratio(AspectRatio::Portrait).await;
        studio
            .set_reference_image(Some(ReferenceImage::from_bytes(vec![3; 8])))
            .await;

        let snapshot = studio.session().snapshot().await;
        assert_eq!(snapshot.prompt(), "a");
        assert_eq!(snapshot.aspect_ratio(), AspectRatio::Portrait);
        assert!(snapshot.reference_image().is_some());
    }

    #[tokio::test]
    async fn test_with_aspect_ratio_keeps_session_state() {
        let (studio, _provider) = studio(ScriptedProvider::new(), StaticCredentialGate::new(true));
        studio.check_credential().await;
        studio.set_prompt("kept").await;

        let studio = studio.with_aspect_ratio(AspectRatio::Standard);

        let snapshot = studio.session().snapshot().await;
        assert_eq!(snapshot.prompt(), "kept");
        assert_eq!(snapshot.aspect_ratio(), AspectRatio::Standard);
        assert!(snapshot.credential_available());
    }

    #[tokio::test]
    async fn test_new_key_reenables_generation() {
        let gate = Arc::new(StaticCredentialGate::new(true));
        let rejecting = Arc::new(
            ScriptedProvider::new()
                .on_generate(0, 0, Reply::Auth)
                .on_generate(1, 0, Reply::Auth)
                .on_generate(2, 0, Reply::Auth),
        );
        let mut studio = Studio::new(rejecting, gate.clone());
        studio.check_credential().await;
        studio.set_prompt("launch poster").await;

        let BatchOutcome::Completed(report) = studio.generate_all().await else {
            panic!("batch skipped");
        };
        assert!(report.credential_lost);
        assert!(matches!(
            studio.generate_all().await,
            BatchOutcome::Skipped(SkipReason::CredentialRequired)
        ));

        let working = Arc::new(ScriptedProvider::new());
        studio.set_provider(working.clone());
        studio.select_credential().await.unwrap();

        let BatchOutcome::Completed(report) = studio.generate_all().await else {
            panic!("batch skipped");
        };
        assert_eq!(report.succeeded(), 3);
        assert_eq!(working.generate_calls(), 3);
    }
}
