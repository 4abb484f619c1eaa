//! Command line front end for the inkreel engine.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::{Confirm, Select};
use gemini::Gemini;
use inkreel_core::assets::AssetService;
use inkreel_core::chapters::{render_review, ChapterService};
use inkreel_core::events::{
    AcceptAll, ChapterHooks, ProgressEvent, PromptDecision, ReviewDecision,
};
use inkreel_core::expand::StoryService;
use inkreel_core::panels::PanelService;
use inkreel_core::project::{
    Chapter, CharacterId, LocationId, NameMatch, Project, ProjectFormat, TimeOfDay,
};
use inkreel_core::store::ProjectStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "inkreel", about = "AI-assisted webtoon production", version)]
struct Cli {
    /// Directory holding all projects.
    #[arg(long, env = "INKREEL_STORE", default_value = "./projects")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Webtoon,
    ShortDrama,
}

impl From<FormatArg> for ProjectFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Webtoon => ProjectFormat::Webtoon,
            FormatArg::ShortDrama => ProjectFormat::ShortDrama,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create a new project.
    Init {
        name: String,
        #[arg(long, value_enum, default_value = "webtoon")]
        format: FormatArg,
    },
    /// List all projects.
    List,
    /// Show a project's story, cast, and chapter progress.
    Status { project: String },
    /// Expand a premise into a story structure.
    Expand {
        project: String,
        premise: String,
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        tone: Option<String>,
        #[arg(long, default_value_t = 10)]
        episodes: u32,
    },
    /// Generate every missing character portrait and location reference.
    Assets {
        project: String,
        #[arg(long)]
        overwrite: bool,
    },
    /// Generate one character's portrait (and optionally a model sheet).
    Portrait {
        project: String,
        character: String,
        #[arg(long)]
        sheet: bool,
        #[arg(long)]
        overwrite: bool,
    },
    /// Generate a location's reference image or a time-of-day variation.
    Scenery {
        project: String,
        location: String,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        overwrite: bool,
    },
    /// Generate chapters from story beats, in order.
    Chapter {
        project: String,
        /// Beat number; omit to generate all remaining beats.
        beat: Option<u32>,
        /// Accept results without interactive review.
        #[arg(long)]
        yes: bool,
    },
    /// Render the panels of a chapter.
    Panels {
        project: String,
        chapter: u32,
        #[arg(long)]
        scene: Option<u32>,
        #[arg(long)]
        overwrite: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let store = ProjectStore::new(&cli.store);

    match cli.command {
        Command::Init { name, format } => {
            let (slug, _) = store.create(&name, format.into()).await?;
            println!("Created project {slug}");
        }
        Command::List => {
            let projects = store.list().await?;
            if projects.is_empty() {
                println!("No projects in {}", cli.store.display());
            }
            for project in projects {
                println!(
                    "{}  {} ({} chapters)",
                    project.slug, project.name, project.chapter_count
                );
            }
        }
        Command::Status { project } => {
            let graph = store.load(&project).await?;
            print_status(&graph);
        }
        Command::Expand {
            project,
            premise,
            genre,
            tone,
            episodes,
        } => {
            let backend = backend()?;
            let service = StoryService::new(store, backend);
            let graph = service
                .expand(&project, &premise, genre.as_deref(), tone.as_deref(), episodes)
                .await?;
            print_status(&graph);
        }
        Command::Assets { project, overwrite } => {
            let backend = backend()?;
            let (sender, printer) = progress_printer();
            let service = AssetService::new(store, backend).with_progress(sender);
            let summary = service.generate_all(&project, overwrite).await?;
            drop(service);
            printer.await.ok();
            println!(
                "Assets: {} generated, {} skipped",
                summary.generated, summary.skipped
            );
        }
        Command::Portrait {
            project,
            character,
            sheet,
            overwrite,
        } => {
            let backend = backend()?;
            let graph = store.load(&project).await?;
            let id = resolve_character(&graph, &character)?;
            let service = AssetService::new(store, backend);
            let path = service.character_portrait(&project, id, overwrite).await?;
            println!("Portrait: {path}");
            if sheet {
                let path = service.character_sheet(&project, id, overwrite).await?;
                println!("Model sheet: {path}");
            }
        }
        Command::Scenery {
            project,
            location,
            time,
            overwrite,
        } => {
            let backend = backend()?;
            let graph = store.load(&project).await?;
            let id = resolve_location(&graph, &location)?;
            let service = AssetService::new(store, backend);
            match time {
                Some(time) => {
                    let time = TimeOfDay::from_loose(&time);
                    let path = service
                        .location_variation(&project, id, time, overwrite)
                        .await?;
                    println!("Variation ({}): {path}", time.name());
                }
                None => {
                    let path = service.location_reference(&project, id, overwrite).await?;
                    println!("Reference: {path}");
                }
            }
        }
        Command::Chapter { project, beat, yes } => {
            let backend = backend()?;
            let graph = store.load(&project).await?;
            let service = ChapterService::new(store, backend);
            let summary = if yes {
                service
                    .generate_batch(&project, beat.map(|b| vec![b]), &AcceptAll)
                    .await?
            } else {
                let hooks = InteractiveReview { project: graph };
                service
                    .generate_batch(&project, beat.map(|b| vec![b]), &hooks)
                    .await?
            };
            println!(
                "Chapters: {:?} generated, {:?} skipped",
                summary.generated, summary.skipped
            );
        }
        Command::Panels {
            project,
            chapter,
            scene,
            overwrite,
        } => {
            let backend = backend()?;
            let (sender, printer) = progress_printer();
            let service = PanelService::new(store, backend).with_progress(sender);
            let summary = service.generate(&project, chapter, scene, overwrite).await?;
            drop(service);
            printer.await.ok();
            println!(
                "Panels: {} generated, {} skipped, {} failed",
                summary.generated,
                summary.skipped,
                summary.failed()
            );
            for error in &summary.errors {
                println!(
                    "  scene {} panel {}: {}",
                    error.scene, error.panel, error.message
                );
            }
        }
    }

    Ok(())
}

fn backend() -> Result<Arc<Gemini>> {
    let mut client =
        Gemini::from_env().context("set GOOGLE_API_KEY or GEMINI_API_KEY in the environment")?;
    if let Ok(dir) = std::env::var("INKREEL_IMAGE_CACHE") {
        client = client.with_cache_dir(dir);
    }
    Ok(Arc::new(client))
}

/// Spawn a task that prints progress events as they arrive.
fn progress_printer() -> (
    inkreel_core::events::ProgressSender,
    tokio::task::JoinHandle<()>,
) {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match event {
                ProgressEvent::ChapterStarted { number } => {
                    println!("Chapter {number}: generating...")
                }
                ProgressEvent::ChapterAttempt { number, attempt } if attempt > 0 => {
                    println!("Chapter {number}: attempt {}", attempt + 1)
                }
                ProgressEvent::ChapterAttempt { .. } => {}
                ProgressEvent::ChapterCompleted { number, title } => {
                    println!("Chapter {number}: \"{title}\"")
                }
                ProgressEvent::ChapterSkipped { number, reason } => {
                    println!("Chapter {number}: skipped ({reason})")
                }
                ProgressEvent::AssetGenerated { label, path } => {
                    println!("Generated {label} -> {path}")
                }
                ProgressEvent::AssetSkipped { label: _, path } => {
                    println!("Skipped existing {path}")
                }
                ProgressEvent::SceneStarted { scene } => {
                    println!("Scene {scene}: rendering...")
                }
                ProgressEvent::PanelStarted { .. } => {}
                ProgressEvent::PanelGenerated { scene, panel, path } => {
                    println!("Scene {scene} panel {panel} -> {path}")
                }
                ProgressEvent::PanelSkipped { scene, panel } => {
                    println!("Scene {scene} panel {panel}: exists, skipped")
                }
                ProgressEvent::PanelFailed { scene, panel, error } => {
                    println!("Scene {scene} panel {panel}: FAILED ({error})")
                }
            }
        }
    });
    (sender, handle)
}

fn resolve_character(project: &Project, name: &str) -> Result<CharacterId> {
    match project.character_by_name(name) {
        NameMatch::Resolved(id) => Ok(id),
        NameMatch::Ambiguous(ids) => {
            let candidates: Vec<_> = ids
                .iter()
                .filter_map(|id| project.character(*id))
                .map(|c| c.name.clone())
                .collect();
            Err(anyhow!(
                "\"{name}\" matches several characters: {}",
                candidates.join(", ")
            ))
        }
        NameMatch::Unresolved => bail!("no character named \"{name}\""),
    }
}

fn resolve_location(project: &Project, name: &str) -> Result<LocationId> {
    match project.location_by_name(name) {
        NameMatch::Resolved(id) => Ok(id),
        NameMatch::Ambiguous(ids) => {
            let candidates: Vec<_> = ids
                .iter()
                .filter_map(|id| project.location(*id))
                .map(|l| l.name.clone())
                .collect();
            Err(anyhow!(
                "\"{name}\" matches several locations: {}",
                candidates.join(", ")
            ))
        }
        NameMatch::Unresolved => bail!("no location named \"{name}\""),
    }
}

fn print_status(project: &Project) {
    println!("{} [{:?}]", project.name, project.status);
    match &project.story {
        Some(story) => {
            println!(
                "\n\"{}\" ({}, {})\n{}",
                story.title,
                story.genre.name(),
                story.tone.name(),
                story.logline
            );
            println!("\nBeats:");
            let chapter_numbers: Vec<u32> = project.chapters.iter().map(|c| c.number).collect();
            for (index, beat) in story.story_beats.iter().enumerate() {
                let number = index as u32 + 1;
                let mark = if chapter_numbers.contains(&number) {
                    "x"
                } else {
                    " "
                };
                println!("  [{mark}] {number}. {}", beat.beat);
            }
        }
        None => println!("\nNo story yet. Run `inkreel expand` first."),
    }

    if !project.characters.is_empty() {
        println!("\nCast:");
        for character in &project.characters {
            let portrait = if character.assets.portrait.is_some() {
                "portrait"
            } else {
                "no portrait"
            };
            println!(
                "  {} ({}, {portrait})",
                character.name,
                character.role.name()
            );
        }
    }
    if !project.locations.is_empty() {
        println!("\nLocations:");
        for location in &project.locations {
            let reference = if location.assets.reference.is_some() {
                "reference"
            } else {
                "no reference"
            };
            println!("  {} ({}, {reference})", location.name, location.kind.name());
        }
    }

    if !project.chapters.is_empty() {
        println!("\nChapters:");
        for chapter in &project.chapters {
            let rendered = chapter
                .scenes
                .iter()
                .flat_map(|s| &s.panels)
                .filter(|p| p.image_path.is_some())
                .count();
            println!(
                "  {}. {} ({} scenes, {}/{} panels rendered)",
                chapter.number,
                chapter.title,
                chapter.scenes.len(),
                rendered,
                chapter.panel_count()
            );
        }
    }
}

/// Review hooks that show each generated chapter and ask to accept,
/// retry, or reject it.
struct InteractiveReview {
    project: Project,
}

#[async_trait]
impl ChapterHooks for InteractiveReview {
    async fn on_prompt_ready(&self, chapter_number: u32, _prompt: &str) -> PromptDecision {
        let proceed = Confirm::new()
            .with_prompt(format!("Generate chapter {chapter_number}?"))
            .default(true)
            .interact()
            .unwrap_or(false);
        if proceed {
            PromptDecision::Proceed
        } else {
            PromptDecision::Skip
        }
    }

    async fn on_result_ready(
        &self,
        _chapter_number: u32,
        attempt: u32,
        chapter: &Chapter,
    ) -> ReviewDecision {
        println!("\n{}", render_review(&self.project, chapter));
        let choice = Select::new()
            .with_prompt(format!("Attempt {} of 3", attempt + 1))
            .items(&["Accept", "Retry", "Reject"])
            .default(0)
            .interact()
            .unwrap_or(2);
        match choice {
            0 => ReviewDecision::Accept,
            1 => ReviewDecision::Retry,
            _ => ReviewDecision::Reject,
        }
    }
}
