//! Fans one "generate" action out into three concurrent requests.

use crate::error::FailureKind;
use crate::image::{GenerationRequest, ImageProvider, ImageSize};
use crate::studio::prompt::cover_prompt;
use crate::studio::session::{BatchId, BatchTicket, ResultSlot, SessionHandle};
use std::sync::Arc;

/// Why a generate action did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The prompt is empty after trimming.
    EmptyPrompt,
    /// Another batch has not completed yet.
    BatchInFlight,
    /// No usable credential is selected.
    CredentialRequired,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPrompt => write!(f, "prompt is empty"),
            Self::BatchInFlight => write!(f, "a batch is already being generated"),
            Self::CredentialRequired => write!(f, "an API key must be selected first"),
        }
    }
}

/// Result of a completed batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// The batch that ran.
    pub batch: BatchId,
    /// Resolved slots, in creation order.
    pub slots: Vec<ResultSlot>,
    /// True if any request reported an unusable credential.
    pub credential_lost: bool,
}

impl BatchReport {
    /// Number of slots holding an image.
    pub fn succeeded(&self) -> usize {
        self.slots.iter().filter(|s| s.is_ready()).count()
    }

    /// Number of failed slots.
    pub fn failed(&self) -> usize {
        self.slots.len() - self.succeeded()
    }
}

/// Outcome of [`BatchOrchestrator::generate_all`].
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// Nothing was started.
    Skipped(SkipReason),
    /// All three requests resolved and were published.
    Completed(BatchReport),
}

/// Runs batches of cover generations against a provider.
#[derive(Clone)]
pub struct BatchOrchestrator {
    session: SessionHandle,
    provider: Arc<dyn ImageProvider>,
    image_size: ImageSize,
    seed: Option<u64>,
}

impl BatchOrchestrator {
    /// Creates an orchestrator publishing into `session`.
    pub fn new(session: SessionHandle, provider: Arc<dyn ImageProvider>) -> Self {
        Self {
            session,
            provider,
            image_size: ImageSize::default(),
            seed: None,
        }
    }

    /// Sets the output resolution requested for every image.
    pub fn with_image_size(mut self, size: ImageSize) -> Self {
        self.image_size = size;
        self
    }

    /// Sets a base seed; each request in a batch offsets it by its index.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Generates three covers from the session's current inputs.
    ///
    /// Placeholders are published before any request is sent. Each request
    /// fails independently; the batch completes once all three resolve.
    pub async fn generate_all(&self) -> BatchOutcome {
        let ticket = {
            let mut session = self.session.lock().await;
            if session.prompt().trim().is_empty() {
                return BatchOutcome::Skipped(SkipReason::EmptyPrompt);
            }
            if session.is_generating() {
                return BatchOutcome::Skipped(SkipReason::BatchInFlight);
            }
            if !session.credential_available() {
                return BatchOutcome::Skipped(SkipReason::CredentialRequired);
            }
            let prompt = session.prompt().to_string();
            match session.start_batch(&prompt) {
                Some(ticket) => ticket,
                None => return BatchOutcome::Skipped(SkipReason::BatchInFlight),
            }
        };

        tracing::debug!(
            batch = %ticket.batch,
            aspect_ratio = %ticket.aspect_ratio,
            reference = ticket.reference_image.is_some(),
            "starting cover batch"
        );

        let base_request = self.base_request(&ticket);
        let batch = ticket.batch;
        let placeholders = ticket.placeholders();

        // Joining and publishing run in their own task so the batch still
        // completes if the caller stops polling this future.
        let runner = tokio::spawn(run_batch(
            self.session.clone(),
            Arc::clone(&self.provider),
            ticket,
            base_request,
        ));

        match runner.await {
            Ok(report) => BatchOutcome::Completed(report),
            Err(e) => {
                tracing::warn!(batch = %batch, "batch task failed: {e}");
                let slots: Vec<ResultSlot> = placeholders
                    .iter()
                    .map(|slot| slot.failed(FailureKind::Unknown))
                    .collect();
                self.session
                    .lock()
                    .await
                    .complete_batch(batch, slots.clone());
                BatchOutcome::Completed(BatchReport {
                    batch,
                    slots,
                    credential_lost: false,
                })
            }
        }
    }

    fn base_request(&self, ticket: &BatchTicket) -> GenerationRequest {
        let prompt = cover_prompt(&ticket.prompt, ticket.reference_image.is_some());
        let mut request = GenerationRequest::new(prompt)
            .with_aspect_ratio(ticket.aspect_ratio)
            .with_image_size(self.image_size);
        if let Some(seed) = self.seed {
            request = request.with_seed(seed);
        }
        if let Some(ref reference) = ticket.reference_image {
            request = request.with_reference_image(reference.clone());
        }
        request
    }
}

/// Fans the ticket out into one task per slot and publishes the results.
async fn run_batch(
    session: SessionHandle,
    provider: Arc<dyn ImageProvider>,
    ticket: BatchTicket,
    base_request: GenerationRequest,
) -> BatchReport {
    let handles: Vec<_> = ticket
        .slot_ids()
        .map(|slot_id| {
            let request = base_request.clone().with_variation(slot_id.index() as u32);
            let provider = Arc::clone(&provider);
            let session = session.clone();

            tokio::spawn(async move {
                let result = provider.generate(&request).await;
                if let Err(ref e) = result {
                    if e.is_credential_failure() {
                        tracing::warn!(slot = %slot_id, "credential rejected: {e}");
                        session.lock().await.set_credential_available(false);
                    } else {
                        tracing::warn!(slot = %slot_id, "cover generation failed: {e}");
                    }
                }
                (slot_id.index(), result)
            })
        })
        .collect();

    let mut slots = ticket.placeholders();
    let mut credential_lost = false;

    for (position, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok((index, result)) => {
                if matches!(result, Err(ref e) if e.is_credential_failure()) {
                    credential_lost = true;
                }
                slots[index] = slots[index].resolved(&result);
            }
            Err(e) => {
                tracing::warn!(batch = %ticket.batch, index = position, "generation task failed: {e}");
                slots[position] = slots[position].failed(FailureKind::Unknown);
            }
        }
    }

    let published = session
        .lock()
        .await
        .complete_batch(ticket.batch, slots.clone());
    if !published {
        tracing::warn!(batch = %ticket.batch, "batch results were not published");
    }

    let report = BatchReport {
        batch: ticket.batch,
        slots,
        credential_lost,
    };
    tracing::info!(
        batch = %report.batch,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "cover batch complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{AspectRatio, ReferenceImage};
    use crate::studio::session::{Session, SlotStatus, BATCH_SIZE};
    use crate::test_support::{tag_of, Reply, ScriptedProvider};

    async fn setup(
        prompt: &str,
        ratio: AspectRatio,
        provider: ScriptedProvider,
    ) -> (SessionHandle, Arc<ScriptedProvider>, BatchOrchestrator) {
        let mut session = Session::new(ratio);
        session.set_prompt(prompt);
        session.set_credential_available(true);
        let handle = SessionHandle::new(session);
        let provider = Arc::new(provider);
        let orchestrator = BatchOrchestrator::new(handle.clone(), provider.clone());
        (handle, provider, orchestrator)
    }

    fn completed(outcome: BatchOutcome) -> BatchReport {
        match outcome {
            BatchOutcome::Completed(report) => report,
            BatchOutcome::Skipped(reason) => panic!("batch skipped: {reason}"),
        }
    }

    async fn wait_for_calls(provider: &ScriptedProvider, calls: usize) {
        while provider.generate_calls() < calls {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_example_batch_all_ready() {
        let (session, provider, orchestrator) = setup(
            "neon cityscape podcast cover",
            AspectRatio::Landscape,
            ScriptedProvider::new(),
        )
        .await;

        let report = completed(orchestrator.generate_all().await);

        assert_eq!(report.slots.len(), BATCH_SIZE);
        assert_eq!(report.succeeded(), 3);
        assert!(!report.credential_lost);
        assert_eq!(provider.generate_calls(), 3);

        let snapshot = session.snapshot().await;
        assert!(!snapshot.is_generating());
        assert_eq!(snapshot.slots(), report.slots.as_slice());
        for slot in snapshot.slots() {
            assert!(slot.is_ready());
            assert_eq!(slot.source_prompt(), "neon cityscape podcast cover");
            assert_eq!(slot.aspect_ratio(), AspectRatio::Landscape);
        }
    }

    #[tokio::test]
    async fn test_requests_use_cover_prompt_and_ratio() {
        let (_session, provider, orchestrator) =
            setup("vintage jazz", AspectRatio::Portrait, ScriptedProvider::new()).await;

        completed(orchestrator.generate_all().await);

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts
            .iter()
            .all(|p| p.contains("Topic: vintage jazz.") && !p.contains("attached image")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_order_independent_of_completion_order() {
        let provider = ScriptedProvider::new()
            .on_generate(0, 10, Reply::Image(10))
            .on_generate(1, 50, Reply::Image(11))
            .on_generate(2, 20, Reply::Image(12));
        let (session, provider, orchestrator) =
            setup("podcast", AspectRatio::Square, provider).await;

        let report = completed(orchestrator.generate_all().await);

        assert_eq!(provider.completion_order(), vec![0, 2, 1]);
        let tags: Vec<u8> = report
            .slots
            .iter()
            .map(|s| tag_of(s.image().unwrap().payload()))
            .collect();
        assert_eq!(tags, vec![10, 11, 12]);
        for (index, slot) in session.snapshot().await.slots().iter().enumerate() {
            assert_eq!(slot.id().index(), index);
        }
    }

    #[tokio::test]
    async fn test_placeholders_published_before_requests_resolve() {
        let (session, provider, orchestrator) = setup(
            "sci-fi novel",
            AspectRatio::Square,
            ScriptedProvider::new().hold_generations(),
        )
        .await;

        let task = tokio::spawn(async move { orchestrator.generate_all().await });
        wait_for_calls(&provider, 3).await;

        let snapshot = session.snapshot().await;
        assert!(snapshot.is_generating());
        assert_eq!(snapshot.slots().len(), 3);
        assert!(snapshot.slots().iter().all(|s| s.is_pending()));

        provider.release_generations(3);
        completed(task.await.unwrap());

        let snapshot = session.snapshot().await;
        assert!(!snapshot.is_generating());
        assert!(snapshot.slots().iter().all(|s| s.is_ready()));
    }

    #[tokio::test]
    async fn test_empty_prompt_is_noop() {
        let (session, provider, orchestrator) =
            setup("   \n ", AspectRatio::Square, ScriptedProvider::new()).await;

        let outcome = orchestrator.generate_all().await;

        assert!(matches!(
            outcome,
            BatchOutcome::Skipped(SkipReason::EmptyPrompt)
        ));
        assert_eq!(provider.generate_calls(), 0);
        let snapshot = session.snapshot().await;
        assert!(snapshot.slots().is_empty());
        assert!(!snapshot.is_generating());
        assert!(snapshot.current_batch().is_none());
    }

    #[tokio::test]
    async fn test_second_batch_refused_while_in_flight() {
        let (session, provider, orchestrator) = setup(
            "first",
            AspectRatio::Square,
            ScriptedProvider::new().hold_generations(),
        )
        .await;

        let running = orchestrator.clone();
        let task = tokio::spawn(async move { running.generate_all().await });
        wait_for_calls(&provider, 3).await;

        session.lock().await.set_prompt("second");
        assert!(matches!(
            orchestrator.generate_all().await,
            BatchOutcome::Skipped(SkipReason::BatchInFlight)
        ));
        assert_eq!(provider.generate_calls(), 3);

        provider.release_generations(3);
        let report = completed(task.await.unwrap());
        assert!(report.slots.iter().all(|s| s.source_prompt() == "first"));
    }

    #[tokio::test]
    async fn test_inputs_snapshotted_at_invocation() {
        let (session, provider, orchestrator) = setup(
            "mountain retreat",
            AspectRatio::Landscape,
            ScriptedProvider::new().hold_generations(),
        )
        .await;
        session
            .lock()
            .await
            .set_reference_image(Some(ReferenceImage::from_bytes(vec![1; 16])));

        let task = tokio::spawn(async move { orchestrator.generate_all().await });
        wait_for_calls(&provider, 3).await;

        {
            let mut s = session.lock().await;
            s.set_prompt("ocean");
            s.set_aspect_ratio(AspectRatio::Portrait);
            s.set_reference_image(None);
        }
        provider.release_generations(3);
        let report = completed(task.await.unwrap());

        assert!(report.slots.iter().all(|s| {
            s.source_prompt() == "mountain retreat" && s.aspect_ratio() == AspectRatio::Landscape
        }));
        assert!(provider
            .prompts()
            .iter()
            .all(|p| p.contains("mountain retreat") && p.contains("attached image")));
        assert_eq!(session.snapshot().await.prompt(), "ocean");
    }

    #[tokio::test]
    async fn test_credential_failure_isolated_and_flips_flag() {
        let provider = ScriptedProvider::new().on_generate(1, 0, Reply::Auth);
        let (session, _provider, orchestrator) =
            setup("startup pitch deck", AspectRatio::Square, provider).await;

        let report = completed(orchestrator.generate_all().await);

        assert!(report.credential_lost);
        assert_eq!(report.slots.len(), 3);
        assert!(report.slots[0].is_ready());
        assert!(report.slots[2].is_ready());
        assert!(matches!(
            report.slots[1].status(),
            SlotStatus::Failed {
                kind: FailureKind::CredentialUnavailable,
                ..
            }
        ));

        let snapshot = session.snapshot().await;
        assert!(!snapshot.credential_available());
        assert!(!snapshot.is_generating());

        assert!(matches!(
            orchestrator.generate_all().await,
            BatchOutcome::Skipped(SkipReason::CredentialRequired)
        ));
    }

    #[tokio::test]
    async fn test_mixed_failures_resolve_every_slot() {
        let provider = ScriptedProvider::new()
            .on_generate(0, 0, Reply::Blocked)
            .on_generate(2, 0, Reply::ServerError);
        let (session, _provider, orchestrator) =
            setup("children's book", AspectRatio::Square, provider).await;

        let report = completed(orchestrator.generate_all().await);

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        assert!(!report.credential_lost);
        assert_eq!(report.slots[0].failure_reason(), Some("Generation failed"));
        assert_eq!(report.slots[2].failure_reason(), Some("Generation failed"));
        assert!(session.snapshot().await.credential_available());
    }

    #[tokio::test]
    async fn test_seed_varies_per_request() {
        let (session, _provider, orchestrator) =
            setup("x", AspectRatio::Square, ScriptedProvider::new()).await;
        let orchestrator = orchestrator.with_seed(Some(7));
        let ticket = session.lock().await.start_batch("x").unwrap();

        let seeds: Vec<Option<u64>> = ticket
            .slot_ids()
            .map(|id| {
                orchestrator
                    .base_request(&ticket)
                    .with_variation(id.index() as u32)
                    .effective_seed()
            })
            .collect();
        assert_eq!(seeds, vec![Some(7), Some(8), Some(9)]);
    }

    #[tokio::test]
    async fn test_panicked_request_becomes_failed_slot() {
        let provider = ScriptedProvider::new().on_generate(1, 0, Reply::Panic);
        let (session, _provider, orchestrator) =
            setup("travel journal", AspectRatio::Square, provider).await;

        let report = completed(orchestrator.generate_all().await);

        assert_eq!(report.slots.len(), BATCH_SIZE);
        assert!(report.slots[0].is_ready());
        assert!(report.slots[2].is_ready());
        assert!(matches!(
            report.slots[1].status(),
            SlotStatus::Failed {
                kind: FailureKind::Unknown,
                ..
            }
        ));
        assert!(!report.credential_lost);

        let snapshot = session.snapshot().await;
        assert!(!snapshot.is_generating());
        assert_eq!(snapshot.slots(), report.slots.as_slice());
    }

    #[tokio::test]
    async fn test_abandoned_batch_still_completes() {
        let (session, provider, orchestrator) = setup(
            "abandoned",
            AspectRatio::Square,
            ScriptedProvider::new().hold_generations(),
        )
        .await;

        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            orchestrator.generate_all(),
        )
        .await;
        assert!(waited.is_err());
        wait_for_calls(&provider, 3).await;

        provider.release_generations(3);
        while session.lock().await.is_generating() {
            tokio::task::yield_now().await;
        }

        let snapshot = session.snapshot().await;
        assert!(snapshot.slots().iter().all(|s| s.is_ready()));

        provider.release_generations(3);
        assert!(matches!(
            orchestrator.generate_all().await,
            BatchOutcome::Completed(_)
        ));
        assert_eq!(provider.generate_calls(), 6);
    }
}
