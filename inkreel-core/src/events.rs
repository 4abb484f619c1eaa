//! Progress events and generation hooks.
//!
//! Long-running generation emits typed events over an unbounded channel
//! (front ends render them however they like), and callers can intercept
//! key moments of chapter generation through [`ChapterHooks`] to review
//! prompts and results before they are committed.

use crate::project::Chapter;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Default number of generation attempts per chapter before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

/// Typed progress notifications from the generation services.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    ChapterStarted {
        number: u32,
    },
    ChapterAttempt {
        number: u32,
        attempt: u32,
    },
    ChapterCompleted {
        number: u32,
        title: String,
    },
    /// The chapter was not produced; the batch continues.
    ChapterSkipped {
        number: u32,
        reason: String,
    },
    AssetGenerated {
        label: String,
        path: String,
    },
    AssetSkipped {
        label: String,
        path: String,
    },
    SceneStarted {
        scene: u32,
    },
    PanelStarted {
        scene: u32,
        panel: u32,
    },
    PanelGenerated {
        scene: u32,
        panel: u32,
        path: String,
    },
    PanelSkipped {
        scene: u32,
        panel: u32,
    },
    PanelFailed {
        scene: u32,
        panel: u32,
        error: String,
    },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Send an event if a sink is attached. A closed receiver is not an
/// error; generation outlives any particular listener.
pub(crate) fn emit(sender: &Option<ProgressSender>, event: ProgressEvent) {
    if let Some(sender) = sender {
        let _ = sender.send(event);
    }
}

/// Caller's verdict on a prompt before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptDecision {
    Proceed,
    /// Abort this chapter without error; batch generation moves on.
    Skip,
}

/// Caller's verdict on a generated chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Accept,
    /// Regenerate, if attempts remain.
    Retry,
    /// Discard and stop trying.
    Reject,
}

/// Resolved next move of the review loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStep {
    Accepted,
    Retry,
    Abandoned,
}

/// Fold a review decision and the attempt counter into the loop's next
/// step. `attempt` is 0-based; a `Retry` on the final attempt abandons.
pub fn review_step(decision: ReviewDecision, attempt: u32, max_attempts: u32) -> ReviewStep {
    match decision {
        ReviewDecision::Accept => ReviewStep::Accepted,
        ReviewDecision::Retry if attempt + 1 < max_attempts => ReviewStep::Retry,
        ReviewDecision::Retry => ReviewStep::Abandoned,
        ReviewDecision::Reject => ReviewStep::Abandoned,
    }
}

/// Interception points in chapter generation. All methods default to
/// letting generation proceed.
#[async_trait]
pub trait ChapterHooks: Send + Sync {
    /// Called once generation of a chapter begins.
    async fn on_start(&self, _chapter_number: u32) {}

    /// Called with the assembled prompt before the backend is invoked.
    async fn on_prompt_ready(&self, _chapter_number: u32, _prompt: &str) -> PromptDecision {
        PromptDecision::Proceed
    }

    /// Called with each generated candidate. `attempt` is 0-based.
    async fn on_result_ready(
        &self,
        _chapter_number: u32,
        _attempt: u32,
        _chapter: &Chapter,
    ) -> ReviewDecision {
        ReviewDecision::Accept
    }

    /// Called after the accepted chapter has been persisted.
    async fn on_complete(&self, _chapter: &Chapter) {}
}

/// Hooks that accept everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl ChapterHooks for AcceptAll {}
