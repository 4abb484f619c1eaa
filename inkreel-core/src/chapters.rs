//! Chapter generation orchestration.
//!
//! One chapter is generated per story beat, strictly in order: chapter N
//! requires chapter N-1 to exist so the continuity context has something
//! to build on. Generation runs a bounded review loop; the caller's hooks
//! can skip the prompt, request a retry, or reject the result outright. A
//! skipped or abandoned chapter yields `Ok(None)` and a batch run keeps
//! going.

use crate::error::ServiceError;
use crate::events::{
    emit, review_step, ChapterHooks, ProgressEvent, ProgressSender, PromptDecision, ReviewStep,
    MAX_ATTEMPTS,
};
use crate::generate::{chapter, GenerationBackend};
use crate::project::{Chapter, Project, ProjectStatus};
use crate::store::ProjectStore;
use crate::deps;
use gemini::StructuredRequest;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a batch chapter run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterBatchSummary {
    pub generated: Vec<u32>,
    pub skipped: Vec<u32>,
}

pub struct ChapterService {
    store: ProjectStore,
    backend: Arc<dyn GenerationBackend>,
    progress: Option<ProgressSender>,
    max_attempts: u32,
}

impl ChapterService {
    pub fn new(store: ProjectStore, backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            store,
            backend,
            progress: None,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Generate the chapter for one story beat.
    ///
    /// Returns `Ok(None)` when the caller's hooks skipped the prompt or
    /// abandoned every candidate; the project is left untouched in that
    /// case.
    pub async fn generate(
        &self,
        project_slug: &str,
        beat_number: u32,
        hooks: &dyn ChapterHooks,
    ) -> Result<Option<Chapter>, ServiceError> {
        self.generate_inner(project_slug, beat_number, hooks, &[]).await
    }

    /// `waived`: chapter numbers whose absence does not block this
    /// generation. A batch waives chapters it skipped itself, so one
    /// declined beat does not dead-end the rest of the run.
    async fn generate_inner(
        &self,
        project_slug: &str,
        beat_number: u32,
        hooks: &dyn ChapterHooks,
        waived: &[u32],
    ) -> Result<Option<Chapter>, ServiceError> {
        let mut project = self.load(project_slug).await?;

        let beat_count = project
            .story
            .as_ref()
            .map(|s| s.story_beats.len() as u32)
            .ok_or_else(|| {
                ServiceError::Validation("project has no story; expand it first".to_string())
            })?;
        if beat_number == 0 || beat_number > beat_count {
            return Err(ServiceError::Validation(format!(
                "beat {beat_number} is out of range (story has {beat_count} beats)"
            )));
        }

        let missing: Vec<_> = deps::missing_for_chapter(&project, beat_number)
            .into_iter()
            .filter(|m| !m.chapter_number.is_some_and(|n| waived.contains(&n)))
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::Dependency(missing));
        }

        hooks.on_start(beat_number).await;
        emit(
            &self.progress,
            ProgressEvent::ChapterStarted {
                number: beat_number,
            },
        );

        // Range and story were validated above.
        let prompt = chapter::build_prompt(&project, beat_number).ok_or_else(|| {
            ServiceError::Validation(format!("no prompt for beat {beat_number}"))
        })?;

        if hooks.on_prompt_ready(beat_number, &prompt).await == PromptDecision::Skip {
            info!(chapter = beat_number, "prompt skipped");
            emit(
                &self.progress,
                ProgressEvent::ChapterSkipped {
                    number: beat_number,
                    reason: "prompt skipped".to_string(),
                },
            );
            return Ok(None);
        }

        let mut accepted = None;
        for attempt in 0..self.max_attempts {
            emit(
                &self.progress,
                ProgressEvent::ChapterAttempt {
                    number: beat_number,
                    attempt,
                },
            );

            let request = StructuredRequest::new(&prompt, chapter::schema())
                .with_system_instruction(chapter::system_instruction())
                .with_temperature(crate::expand::STRUCTURED_TEMPERATURE);
            let (value, _meta) = self.backend.structured(request).await?;
            let response: chapter::ChapterResponse = serde_json::from_value(value)
                .map_err(|e| ServiceError::Backend(format!("malformed chapter response: {e}")))?;

            let converted = chapter::convert(response, &project, beat_number);
            for issue in &converted.issues {
                warn!(
                    chapter = beat_number,
                    context = %issue.context,
                    name = %issue.name,
                    "unresolved name in generated chapter"
                );
            }

            let decision = hooks
                .on_result_ready(beat_number, attempt, &converted.chapter)
                .await;
            match review_step(decision, attempt, self.max_attempts) {
                ReviewStep::Accepted => {
                    accepted = Some(converted.chapter);
                    break;
                }
                ReviewStep::Retry => continue,
                ReviewStep::Abandoned => {
                    info!(chapter = beat_number, attempt, "chapter abandoned");
                    emit(
                        &self.progress,
                        ProgressEvent::ChapterSkipped {
                            number: beat_number,
                            reason: "abandoned after review".to_string(),
                        },
                    );
                    return Ok(None);
                }
            }
        }

        let Some(chapter) = accepted else {
            // Unreachable with max_attempts >= 1; kept as a skip for safety.
            return Ok(None);
        };

        project.upsert_chapter(chapter.clone());
        project.status = ProjectStatus::InProgress;
        self.save(project_slug, &project).await?;

        hooks.on_complete(&chapter).await;
        info!(chapter = beat_number, title = %chapter.title, "chapter generated");
        emit(
            &self.progress,
            ProgressEvent::ChapterCompleted {
                number: beat_number,
                title: chapter.title.clone(),
            },
        );
        Ok(Some(chapter))
    }

    /// Generate a sequence of chapters, ascending. When `beats` is `None`
    /// every beat without a chapter is attempted.
    ///
    /// Skipped chapters do not abort the run: later beats waive their
    /// dependency on a chapter this same run skipped and generate with
    /// whatever continuity context exists. Any error other than an unmet
    /// dependency stops the batch.
    pub async fn generate_batch(
        &self,
        project_slug: &str,
        beats: Option<Vec<u32>>,
        hooks: &dyn ChapterHooks,
    ) -> Result<ChapterBatchSummary, ServiceError> {
        let mut beat_numbers = match beats {
            Some(beats) => beats,
            None => self.remaining(project_slug).await?,
        };
        beat_numbers.sort_unstable();
        beat_numbers.dedup();

        let mut summary = ChapterBatchSummary::default();
        for beat_number in beat_numbers {
            match self
                .generate_inner(project_slug, beat_number, hooks, &summary.skipped)
                .await
            {
                Ok(Some(_)) => summary.generated.push(beat_number),
                Ok(None) => summary.skipped.push(beat_number),
                Err(ServiceError::Dependency(missing)) => {
                    warn!(chapter = beat_number, "dependencies unmet, skipping");
                    summary.skipped.push(beat_number);
                    emit(
                        &self.progress,
                        ProgressEvent::ChapterSkipped {
                            number: beat_number,
                            reason: missing
                                .first()
                                .map(|m| m.message.clone())
                                .unwrap_or_default(),
                        },
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }

    /// Beats that do not yet have a chapter, ascending.
    pub async fn remaining(&self, project_slug: &str) -> Result<Vec<u32>, ServiceError> {
        Ok(self.load(project_slug).await?.remaining_beats())
    }

    async fn load(&self, slug: &str) -> Result<Project, ServiceError> {
        self.store
            .load(slug)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))
    }

    async fn save(&self, slug: &str, project: &Project) -> Result<(), ServiceError> {
        self.store
            .save(slug, project)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))
    }
}

/// Render a chapter as review text: scenes, panels, and dialogue.
pub fn render_review(project: &Project, chapter: &Chapter) -> String {
    let mut out = format!("Chapter {}: {}\n{}\n", chapter.number, chapter.title, chapter.summary);
    for scene in &chapter.scenes {
        out.push_str(&format!(
            "\nScene {} [{}{}] {}\n",
            scene.number,
            scene.time_of_day.name(),
            scene
                .location_id
                .and_then(|id| project.location(id))
                .map(|l| format!(", {}", l.name))
                .unwrap_or_default(),
            scene.description
        ));
        for panel in &scene.panels {
            out.push_str(&format!("  Panel {}: {}\n", panel.number, panel.action));
            for line in &panel.dialogue {
                let speaker = line
                    .speaker
                    .and_then(|id| project.character(id))
                    .map(|c| c.name.as_str())
                    .unwrap_or("?");
                out.push_str(&format!("    {speaker}: \"{}\"\n", line.text));
            }
        }
    }
    out
}
