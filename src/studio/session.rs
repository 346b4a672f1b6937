//! Session state: prompt inputs, the result slots and batch bookkeeping.
//!
//! A [`Session`] is only ever mutated through its methods, each of which
//! replaces whole values, and is shared between tasks through a
//! [`SessionHandle`]. Locks are never held across a provider call.

use crate::error::{CoverGenError, FailureKind};
use crate::image::{AspectRatio, GeneratedImage, ReferenceImage};
use crate::studio::prompt::refined_source_prompt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Number of covers requested per batch.
pub const BATCH_SIZE: usize = 3;

/// Identifies one generation batch within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl BatchId {
    /// Returns the numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a result slot: its batch plus its position in that batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    batch: BatchId,
    index: usize,
}

impl SlotId {
    /// Batch this slot belongs to.
    pub fn batch(&self) -> BatchId {
        self.batch
    }

    /// Position of the slot in its batch (0-based).
    pub fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.batch, self.index)
    }
}

/// Image held by a finished slot.
///
/// Keeps both the raw payload (re-submitted on refinement) and a
/// displayable data URL.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotImage {
    image: GeneratedImage,
    data_url: String,
}

impl SlotImage {
    /// Wraps a generated image.
    pub fn new(image: GeneratedImage) -> Self {
        let data_url = image.to_data_url();
        Self { image, data_url }
    }

    /// Raw encoded image bytes.
    pub fn payload(&self) -> &[u8] {
        &self.image.data
    }

    /// `data:` URL suitable for display.
    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// The underlying generated image.
    pub fn image(&self) -> &GeneratedImage {
        &self.image
    }
}

/// Lifecycle state of a result slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotStatus {
    /// Waiting for its generation request.
    Pending,
    /// Holds a usable image.
    Ready(SlotImage),
    /// The request failed.
    Failed {
        /// Failure category.
        kind: FailureKind,
        /// Short message for display.
        reason: String,
    },
}

/// One of the covers requested in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSlot {
    id: SlotId,
    source_prompt: String,
    aspect_ratio: AspectRatio,
    status: SlotStatus,
    revision: u32,
}

impl ResultSlot {
    /// Creates a placeholder awaiting its image.
    pub fn pending(id: SlotId, source_prompt: impl Into<String>, aspect_ratio: AspectRatio) -> Self {
        Self {
            id,
            source_prompt: source_prompt.into(),
            aspect_ratio,
            status: SlotStatus::Pending,
            revision: 0,
        }
    }

    /// Returns this slot resolved with the outcome of its request.
    pub fn resolved(&self, outcome: &Result<GeneratedImage, CoverGenError>) -> Self {
        let status = match outcome {
            Ok(image) => SlotStatus::Ready(SlotImage::new(image.clone())),
            Err(e) => {
                let kind = e.failure_kind();
                SlotStatus::Failed {
                    kind,
                    reason: kind.user_message().to_string(),
                }
            }
        };
        Self {
            status,
            ..self.clone()
        }
    }

    /// Returns this slot marked failed.
    pub fn failed(&self, kind: FailureKind) -> Self {
        Self {
            status: SlotStatus::Failed {
                kind,
                reason: kind.user_message().to_string(),
            },
            ..self.clone()
        }
    }

    /// Returns this slot with a refined image and an annotated prompt.
    pub fn refined(&self, image: GeneratedImage, instruction: &str) -> Self {
        Self {
            id: self.id,
            source_prompt: refined_source_prompt(&self.source_prompt, instruction),
            aspect_ratio: self.aspect_ratio,
            status: SlotStatus::Ready(SlotImage::new(image)),
            revision: self.revision + 1,
        }
    }

    /// Slot identifier.
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Number of refinements applied to this slot.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Text that produced this image, including applied refinements.
    pub fn source_prompt(&self) -> &str {
        &self.source_prompt
    }

    /// Aspect ratio fixed when the batch started.
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    /// Current status.
    pub fn status(&self) -> &SlotStatus {
        &self.status
    }

    /// The image, when the slot is ready.
    pub fn image(&self) -> Option<&SlotImage> {
        match &self.status {
            SlotStatus::Ready(image) => Some(image),
            _ => None,
        }
    }

    /// The failure message, when the slot failed.
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            SlotStatus::Failed { reason, .. } => Some(reason.as_str()),
            _ => None,
        }
    }

    /// Returns true while the slot awaits its request.
    pub fn is_pending(&self) -> bool {
        matches!(self.status, SlotStatus::Pending)
    }

    /// Returns true if the slot holds an image.
    pub fn is_ready(&self) -> bool {
        matches!(self.status, SlotStatus::Ready(_))
    }
}

/// Inputs captured when a batch starts.
///
/// Edits made to the session afterwards never reach the batch.
#[derive(Debug, Clone)]
pub struct BatchTicket {
    /// The batch started.
    pub batch: BatchId,
    /// Prompt text at start time.
    pub prompt: String,
    /// Aspect ratio at start time.
    pub aspect_ratio: AspectRatio,
    /// Reference image at start time.
    pub reference_image: Option<ReferenceImage>,
}

impl BatchTicket {
    /// Identifiers of the batch's slots, in order.
    pub fn slot_ids(&self) -> impl Iterator<Item = SlotId> {
        let batch = self.batch;
        (0..BATCH_SIZE).map(move |index| SlotId { batch, index })
    }

    /// Pending placeholders for every slot, in order.
    pub fn placeholders(&self) -> Vec<ResultSlot> {
        self.slot_ids()
            .map(|id| ResultSlot::pending(id, self.prompt.clone(), self.aspect_ratio))
            .collect()
    }
}

/// Everything the studio knows for the life of the process.
#[derive(Debug, Clone)]
pub struct Session {
    prompt: String,
    aspect_ratio: AspectRatio,
    reference_image: Option<ReferenceImage>,
    slots: Vec<ResultSlot>,
    current_batch: Option<BatchId>,
    generating: bool,
    credential_available: bool,
    next_batch: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(AspectRatio::default())
    }
}

impl Session {
    /// Creates an empty session with the given ratio selected.
    pub fn new(aspect_ratio: AspectRatio) -> Self {
        Self {
            prompt: String::new(),
            aspect_ratio,
            reference_image: None,
            slots: Vec::new(),
            current_batch: None,
            generating: false,
            credential_available: false,
            next_batch: 1,
        }
    }

    /// Current prompt text.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Currently selected aspect ratio.
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    /// Attached reference image, if any.
    pub fn reference_image(&self) -> Option<&ReferenceImage> {
        self.reference_image.as_ref()
    }

    /// Result slots of the latest batch (empty or exactly three).
    pub fn slots(&self) -> &[ResultSlot] {
        &self.slots
    }

    /// Looks up a slot of the latest batch.
    pub fn slot(&self, id: SlotId) -> Option<&ResultSlot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    /// Latest batch started, if any.
    pub fn current_batch(&self) -> Option<BatchId> {
        self.current_batch
    }

    /// Returns true while a batch is in flight.
    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Returns true if a usable credential is selected.
    pub fn credential_available(&self) -> bool {
        self.credential_available
    }

    /// Returns true if a new batch could start right now.
    pub fn can_generate(&self) -> bool {
        !self.prompt.trim().is_empty() && !self.generating && self.credential_available
    }

    /// Replaces the prompt text.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Selects an aspect ratio for the next batch.
    pub fn set_aspect_ratio(&mut self, ratio: AspectRatio) {
        self.aspect_ratio = ratio;
    }

    /// Attaches or removes the reference image.
    pub fn set_reference_image(&mut self, image: Option<ReferenceImage>) {
        self.reference_image = image;
    }

    /// Records whether a usable credential is selected.
    pub fn set_credential_available(&mut self, available: bool) {
        self.credential_available = available;
    }

    /// Starts a batch for `prompt`, publishing three pending slots.
    ///
    /// Returns `None` without changing anything if the prompt is blank or a
    /// batch is already in flight.
    pub fn start_batch(&mut self, prompt: &str) -> Option<BatchTicket> {
        if prompt.trim().is_empty() || self.generating {
            return None;
        }

        let batch = BatchId(self.next_batch);
        self.next_batch += 1;

        let ticket = BatchTicket {
            batch,
            prompt: prompt.to_string(),
            aspect_ratio: self.aspect_ratio,
            reference_image: self.reference_image.clone(),
        };

        self.slots = ticket.placeholders();
        self.current_batch = Some(batch);
        self.generating = true;
        Some(ticket)
    }

    /// Publishes the resolved slots of the in-flight batch.
    ///
    /// Ignored (returns false) for a batch other than the one in flight, or
    /// when `results` is not exactly that batch's slots, resolved, in order.
    pub fn complete_batch(&mut self, batch: BatchId, results: Vec<ResultSlot>) -> bool {
        if !self.generating || self.current_batch != Some(batch) {
            return false;
        }
        let well_formed = results.len() == BATCH_SIZE
            && results.iter().enumerate().all(|(index, slot)| {
                slot.id == SlotId { batch, index } && !slot.is_pending()
            });
        if !well_formed {
            return false;
        }

        self.slots = results;
        self.generating = false;
        true
    }

    /// Replaces `base` with its refinement `updated`.
    ///
    /// Ignored (returns false) unless the stored slot is still exactly the
    /// revision the refinement started from.
    pub fn apply_refinement(&mut self, base: &ResultSlot, updated: ResultSlot) -> bool {
        if updated.id != base.id {
            return false;
        }
        match self.slots.iter_mut().find(|slot| slot.id == base.id) {
            Some(slot) if slot.revision == base.revision => {
                *slot = updated;
                true
            }
            _ => false,
        }
    }

    /// Replaces the slot with the same id. Returns false if there is none.
    pub fn replace_slot(&mut self, updated: ResultSlot) -> bool {
        match self.slots.iter_mut().find(|slot| slot.id == updated.id) {
            Some(slot) => {
                *slot = updated;
                true
            }
            None => false,
        }
    }
}

/// Shared, lockable access to a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    /// Wraps a session for sharing.
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    /// Locks the session for reading or mutation.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().await
    }

    /// Locks the session if no one else holds it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Session>> {
        self.0.try_lock().ok()
    }

    /// Returns a copy of the current state.
    pub async fn snapshot(&self) -> Session {
        self.0.lock().await.clone()
    }
}
