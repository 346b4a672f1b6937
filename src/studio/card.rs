//! Per-result refinement: an edit draft that is committed only on success.

use crate::error::FailureKind;
use crate::image::{AspectRatio, EditRequest, ImageProvider, ImageSize};
use crate::studio::prompt::edit_prompt;
use crate::studio::session::{ResultSlot, SessionHandle, SlotId};

/// Where a card is in its edit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardMode {
    /// Showing the slot.
    Viewing,
    /// Editor open, draft instruction being written.
    Editing,
    /// A refine request is outstanding.
    Refining,
}

/// Outcome of [`CardController::submit`].
#[derive(Debug, Clone)]
pub enum RefineOutcome {
    /// The refined slot replaced the original.
    Applied(ResultSlot),
    /// The draft was blank; nothing was sent.
    EmptyInstruction,
    /// The editor is not open.
    NotEditing,
    /// No usable credential is selected; nothing was sent.
    CredentialRequired,
    /// The slot no longer exists or holds no image.
    SlotUnavailable,
    /// The refinement succeeded but the slot was replaced or refined
    /// by someone else meanwhile.
    Stale,
    /// The request failed; the slot is unchanged.
    Failed {
        /// Failure category.
        kind: FailureKind,
        /// Short message for display.
        message: String,
    },
}

/// Builds the edit request for refining `image` with `instruction`.
///
/// Returns `None` for a blank instruction.
pub fn refine_request(
    image: &[u8],
    instruction: &str,
    aspect_ratio: AspectRatio,
    image_size: ImageSize,
) -> Option<EditRequest> {
    let instruction = instruction.trim();
    if instruction.is_empty() {
        return None;
    }
    Some(
        EditRequest::new(image.to_vec(), edit_prompt(instruction))
            .with_aspect_ratio(aspect_ratio)
            .with_image_size(image_size),
    )
}

/// Local edit state for one result slot.
///
/// The draft and busy state live here, never in the shared session.
#[derive(Debug, Clone)]
pub struct CardController {
    slot_id: SlotId,
    mode: CardMode,
    draft: String,
    last_error: Option<String>,
    image_size: ImageSize,
}

impl CardController {
    /// Creates a controller for `slot_id`, in viewing mode.
    pub fn new(slot_id: SlotId) -> Self {
        Self {
            slot_id,
            mode: CardMode::Viewing,
            draft: String::new(),
            last_error: None,
            image_size: ImageSize::default(),
        }
    }

    /// Sets the output resolution requested for refinements.
    pub fn with_image_size(mut self, size: ImageSize) -> Self {
        self.image_size = size;
        self
    }

    /// Slot this card controls.
    pub fn slot_id(&self) -> SlotId {
        self.slot_id
    }

    /// Current mode.
    pub fn mode(&self) -> CardMode {
        self.mode
    }

    /// Returns true while a refine request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.mode == CardMode::Refining
    }

    /// Current draft instruction.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Message from the last failed refinement, cleared by the next action.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Opens the editor. Only slots holding an image can be edited.
    pub fn open_editor(&mut self, slot: &ResultSlot) -> bool {
        if self.mode != CardMode::Viewing || slot.id() != self.slot_id || !slot.is_ready() {
            return false;
        }
        self.mode = CardMode::Editing;
        self.last_error = None;
        true
    }

    /// Replaces the draft instruction while editing.
    pub fn set_draft(&mut self, text: impl Into<String>) {
        if self.mode == CardMode::Editing {
            self.draft = text.into();
        }
    }

    /// Closes the editor and discards the draft. Refused while refining.
    pub fn cancel(&mut self) -> bool {
        if self.mode != CardMode::Editing {
            return false;
        }
        self.reset();
        true
    }

    /// Sends the draft as a refinement of the slot's current image.
    ///
    /// On success the slot is replaced in the session and the card returns
    /// to viewing. On failure the slot is untouched and the editor stays open.
    pub async fn submit(
        &mut self,
        session: &SessionHandle,
        provider: &dyn ImageProvider,
    ) -> RefineOutcome {
        if self.mode != CardMode::Editing {
            return RefineOutcome::NotEditing;
        }
        let instruction = self.draft.trim().to_string();
        if instruction.is_empty() {
            return RefineOutcome::EmptyInstruction;
        }

        let slot = {
            let session = session.lock().await;
            if !session.credential_available() {
                return RefineOutcome::CredentialRequired;
            }
            session
                .slot(self.slot_id)
                .filter(|slot| slot.is_ready())
                .cloned()
        };
        let Some(slot) = slot else {
            self.reset();
            return RefineOutcome::SlotUnavailable;
        };
        let Some(image) = slot.image() else {
            self.reset();
            return RefineOutcome::SlotUnavailable;
        };
        let Some(request) = refine_request(
            image.payload(),
            &instruction,
            slot.aspect_ratio(),
            self.image_size,
        ) else {
            return RefineOutcome::EmptyInstruction;
        };

        self.mode = CardMode::Refining;
        self.last_error = None;
        tracing::debug!(slot = %self.slot_id, "refining cover");

        match provider.edit(&request).await {
            Ok(refined) => {
                let updated = slot.refined(refined, &instruction);
                let applied = session
                    .lock()
                    .await
                    .apply_refinement(&slot, updated.clone());
                self.reset();
                if applied {
                    RefineOutcome::Applied(updated)
                } else {
                    tracing::debug!(slot = %self.slot_id, "discarding refinement of a replaced slot");
                    RefineOutcome::Stale
                }
            }
            Err(e) => {
                let kind = e.failure_kind();
                if kind == FailureKind::CredentialUnavailable {
                    tracing::warn!(slot = %self.slot_id, "credential rejected during refine: {e}");
                    session.lock().await.set_credential_available(false);
                } else {
                    tracing::warn!(slot = %self.slot_id, "refine failed: {e}");
                }
                let message = match kind {
                    FailureKind::CredentialUnavailable => kind.user_message().to_string(),
                    _ => "Refinement failed".to_string(),
                };
                self.mode = CardMode::Editing;
                self.last_error = Some(message.clone());
                RefineOutcome::Failed { kind, message }
            }
        }
    }

    fn reset(&mut self) {
        self.mode = CardMode::Viewing;
        self.draft.clear();
        self.last_error = None;
    }
}
