//! CLI for CoverGen - AI cover image studio.

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand, ValueEnum};
use covergen::studio::card::refine_request;
use covergen::studio::{
    BatchOutcome, CardController, RefineOutcome, ResultSlot, SkipReason, SlotStatus, Studio,
};
use covergen::{
    AspectRatio, CoverGenError, EditRequest, EnvCredentialGate, GeminiProvider, GeneratedImage,
    GenerationRequest, ImageProvider, ImageProviderKind, ReferenceImage, StaticCredentialGate,
    StudioConfig,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "covergen")]
#[command(about = "Generate and refine AI cover images, three at a time")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate three covers from a topic
    Generate(GenerateArgs),

    /// Refine an existing cover with an instruction
    Refine(RefineArgs),

    /// Run an interactive studio session
    Studio,

    /// Report whether an API key is configured
    Check,
}

#[derive(Args)]
struct GenerateArgs {
    /// What the cover is about
    prompt: String,

    /// Aspect ratio (defaults to COVERGEN_ASPECT_RATIO or 1:1)
    #[arg(long, value_enum)]
    aspect_ratio: Option<AspectRatioArg>,

    /// Reference image guiding composition, style or palette
    #[arg(short, long)]
    reference: Option<PathBuf>,

    /// Directory the covers are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Base seed for deterministic generation
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct RefineArgs {
    /// Cover image to refine
    image: PathBuf,

    /// What to change
    instruction: String,

    /// Aspect ratio of the cover
    #[arg(long, value_enum, default_value = "1:1")]
    aspect_ratio: AspectRatioArg,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectRatioArg {
    #[value(name = "1:1")]
    Square,
    #[value(name = "16:9")]
    Landscape,
    #[value(name = "9:16")]
    Portrait,
    #[value(name = "4:3")]
    Standard,
    #[value(name = "3:4")]
    StandardPortrait,
}

impl From<AspectRatioArg> for AspectRatio {
    fn from(arg: AspectRatioArg) -> Self {
        match arg {
            AspectRatioArg::Square => AspectRatio::Square,
            AspectRatioArg::Landscape => AspectRatio::Landscape,
            AspectRatioArg::Portrait => AspectRatio::Portrait,
            AspectRatioArg::Standard => AspectRatio::Standard,
            AspectRatioArg::StandardPortrait => AspectRatio::StandardPortrait,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("COVERGEN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = StudioConfig::from_env()?;

    match cli.command {
        Commands::Generate(args) => {
            generate_covers(args, &config, cli.json).await?;
        }
        Commands::Refine(args) => {
            refine_cover(args, &config, cli.json).await?;
        }
        Commands::Studio => {
            run_studio(&config).await?;
        }
        Commands::Check => {
            check_credential(&config, cli.json).await?;
        }
    }

    Ok(())
}

fn slot_file_name(slot: &ResultSlot) -> Option<String> {
    slot.image()
        .map(|image| format!("cover-{}.{}", slot.id(), image.image().format.extension()))
}

fn save_slots(slots: &[ResultSlot], dir: &Path) -> anyhow::Result<Vec<Option<PathBuf>>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(slots.len());
    for slot in slots {
        match (slot.image(), slot_file_name(slot)) {
            (Some(image), Some(name)) => {
                let path = dir.join(name);
                image.image().save(&path)?;
                written.push(Some(path));
            }
            _ => written.push(None),
        }
    }
    Ok(written)
}

async fn generate_covers(
    args: GenerateArgs,
    config: &StudioConfig,
    json_output: bool,
) -> anyhow::Result<()> {
    let ratio = args
        .aspect_ratio
        .map(AspectRatio::from)
        .unwrap_or(config.aspect_ratio);
    let studio = Studio::from_config(config, Arc::new(EnvCredentialGate))?
        .with_aspect_ratio(ratio)
        .with_seed(args.seed);

    if !studio.check_credential().await {
        anyhow::bail!("API key required: set GOOGLE_API_KEY");
    }
    studio.set_prompt(&args.prompt).await;
    if let Some(ref path) = args.reference {
        studio
            .set_reference_image(Some(ReferenceImage::from_path(path)?))
            .await;
    }

    let report = match studio.generate_all().await {
        BatchOutcome::Completed(report) => report,
        BatchOutcome::Skipped(reason) => anyhow::bail!("Nothing generated: {reason}"),
    };
    let written = save_slots(&report.slots, &args.output_dir)?;

    if json_output {
        let covers: Vec<_> = report
            .slots
            .iter()
            .zip(&written)
            .map(|(slot, path)| {
                serde_json::json!({
                    "slot": slot.id().to_string(),
                    "success": slot.is_ready(),
                    "output": path.as_ref().map(|p| p.display().to_string()),
                    "error": slot.failure_reason(),
                    "size_bytes": slot.image().map(|i| i.image().size()),
                })
            })
            .collect();
        let result = serde_json::json!({
            "type": "covers",
            "prompt": args.prompt,
            "aspect_ratio": ratio.as_str(),
            "succeeded": report.succeeded(),
            "failed": report.failed(),
            "covers": covers,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for (slot, path) in report.slots.iter().zip(&written) {
            match path {
                Some(path) => println!("Cover {}: {}", slot.id(), path.display()),
                None => println!(
                    "Cover {}: {}",
                    slot.id(),
                    slot.failure_reason().unwrap_or("Generation failed")
                ),
            }
        }
        if report.credential_lost {
            eprintln!("The API key was rejected; select a valid key before generating again.");
        }
    }

    Ok(())
}

async fn refine_cover(args: RefineArgs, config: &StudioConfig, json_output: bool) -> anyhow::Result<()> {
    let source = std::fs::read(&args.image)?;
    let request = refine_request(
        &source,
        &args.instruction,
        args.aspect_ratio.into(),
        config.image_size,
    )
    .ok_or_else(|| anyhow::anyhow!("Instruction is empty; nothing to refine"))?;
    let provider = config.gemini_provider()?;

    let image = provider.edit(&request).await?;
    image.save(&args.output)?;

    if json_output {
        let result = serde_json::json!({
            "type": "refine",
            "success": true,
            "output": args.output.display().to_string(),
            "size_bytes": image.size(),
            "model": image.metadata.model,
            "duration_ms": image.metadata.duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Refined cover: {} ({} bytes)",
            args.output.display(),
            image.size()
        );
        if let Some(duration) = image.metadata.duration_ms {
            println!("Duration: {}ms", duration);
        }
    }

    Ok(())
}

async fn check_credential(config: &StudioConfig, json_output: bool) -> anyhow::Result<()> {
    let available = config.api_key.is_some();
    let reachable = if available {
        Some(config.gemini_provider()?.health_check().await.is_ok())
    } else {
        None
    };

    if json_output {
        let result = serde_json::json!({
            "credential_available": available,
            "reachable": reachable,
            "model": config.model.as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !available {
        println!("No API key found (GOOGLE_API_KEY, GEMINI_API_KEY or API_KEY)");
    } else {
        println!("API key found, model {}", config.model.as_str());
        if reachable == Some(false) {
            println!("Warning: the API rejected the key or could not be reached");
        }
    }

    Ok(())
}

const STUDIO_HELP: &str = "\
Commands:
  prompt <text>          set the cover topic
  ratio <1:1|16:9|9:16>  select the aspect ratio
  ref <path>             attach a reference image
  unref                  remove the reference image
  generate               create three covers
  edit <n> <instruction> open cover n for refinement
  apply                  send the open refinement
  cancel                 close the editor
  save <dir>             write the ready covers to a directory
  key <API_KEY>          select an API key
  check                  verify the selected API key again
  show                   print the session
  quit                   leave";

/// Stands in for the Gemini provider until a key is selected.
struct NoKeyProvider;

fn missing_key() -> CoverGenError {
    CoverGenError::Auth("no API key selected; use `key <API_KEY>`".into())
}

#[async_trait]
impl ImageProvider for NoKeyProvider {
    async fn generate(&self, _request: &GenerationRequest) -> covergen::Result<GeneratedImage> {
        Err(missing_key())
    }

    async fn edit(&self, _request: &EditRequest) -> covergen::Result<GeneratedImage> {
        Err(missing_key())
    }

    fn kind(&self) -> ImageProviderKind {
        ImageProviderKind::Custom
    }

    async fn health_check(&self) -> covergen::Result<()> {
        Err(missing_key())
    }
}

async fn run_studio(config: &StudioConfig) -> anyhow::Result<()> {
    let gate = Arc::new(StaticCredentialGate::new(false));
    let provider: Arc<dyn ImageProvider> = match config.gemini_provider() {
        Ok(provider) => {
            gate.set_available(true);
            Arc::new(provider)
        }
        Err(e) => {
            tracing::debug!("starting without a provider: {e}");
            Arc::new(NoKeyProvider)
        }
    };
    let mut studio = Studio::new(provider, gate.clone())
        .with_aspect_ratio(config.aspect_ratio)
        .with_image_size(config.image_size);
    if !studio.check_credential().await {
        println!("No API key selected. Use `key <API_KEY>` or set GOOGLE_API_KEY.");
    }
    println!("{STUDIO_HELP}");

    let mut card: Option<CardController> = None;
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "" => {}
            "quit" | "exit" => break,
            "help" => println!("{STUDIO_HELP}"),
            "prompt" => studio.set_prompt(rest).await,
            "ratio" => match rest.parse::<AspectRatio>() {
                Ok(ratio) => studio.set_aspect_ratio(ratio).await,
                Err(e) => println!("{e}"),
            },
            "ref" => match ReferenceImage::from_path(rest) {
                Ok(image) => studio.set_reference_image(Some(image)).await,
                Err(e) => println!("Could not read reference image: {e}"),
            },
            "unref" => studio.set_reference_image(None).await,
            "generate" => {
                card = None;
                match studio.generate_all().await {
                    BatchOutcome::Completed(report) => {
                        println!("{} ready, {} failed", report.succeeded(), report.failed());
                        if report.credential_lost {
                            println!("API key required");
                        }
                    }
                    BatchOutcome::Skipped(SkipReason::CredentialRequired) => println!(
                        "Not generating: {}. Use `key <API_KEY>` or `check`.",
                        SkipReason::CredentialRequired
                    ),
                    BatchOutcome::Skipped(reason) => println!("Not generating: {reason}"),
                }
            }
            "key" => {
                if rest.is_empty() {
                    println!("Usage: key <API_KEY>");
                    continue;
                }
                let provider = GeminiProvider::builder()
                    .api_key(rest)
                    .model(config.model)
                    .build()?;
                studio.set_provider(Arc::new(provider));
                studio.select_credential().await?;
                println!("API key selected");
            }
            "check" => {
                let verified = studio.provider().health_check().await;
                gate.set_available(verified.is_ok());
                if studio.check_credential().await {
                    println!("API key OK");
                } else {
                    println!(
                        "API key required: {}",
                        verified.err().map(|e| e.to_string()).unwrap_or_default()
                    );
                }
            }
            "edit" => {
                let (index, instruction) = rest.split_once(' ').unwrap_or((rest, ""));
                let slot = match index.parse::<usize>() {
                    Ok(n) if n >= 1 => studio.session().snapshot().await.slots().get(n - 1).cloned(),
                    _ => None,
                };
                match slot {
                    Some(slot) => {
                        let mut next = studio.card(slot.id());
                        if next.open_editor(&slot) {
                            next.set_draft(instruction);
                            card = Some(next);
                        } else {
                            println!("Cover {index} has no image to refine");
                        }
                    }
                    None => println!("No cover {index}"),
                }
            }
            "apply" => match card.as_mut() {
                Some(open) => match studio.refine(open).await {
                    RefineOutcome::Applied(slot) => {
                        println!("Cover {} refined: {}", slot.id(), slot.source_prompt());
                        card = None;
                    }
                    RefineOutcome::EmptyInstruction => println!("Instruction is empty"),
                    RefineOutcome::CredentialRequired => {
                        println!("API key required. Use `key <API_KEY>` or `check`.")
                    }
                    RefineOutcome::Failed { message, .. } => println!("{message}"),
                    RefineOutcome::NotEditing
                    | RefineOutcome::SlotUnavailable
                    | RefineOutcome::Stale => {
                        println!("That cover is no longer available");
                        card = None;
                    }
                },
                None => println!("No cover is open for editing"),
            },
            "cancel" => {
                if card.as_mut().is_some_and(CardController::cancel) {
                    card = None;
                }
            }
            "save" => {
                let dir = if rest.is_empty() { "." } else { rest };
                let snapshot = studio.session().snapshot().await;
                for path in save_slots(snapshot.slots(), Path::new(dir))?.into_iter().flatten() {
                    println!("Saved {}", path.display());
                }
            }
            "show" => print_session(&studio, card.as_ref()).await,
            other => println!("Unknown command: {other} (try help)"),
        }
    }

    Ok(())
}

async fn print_session(studio: &Studio, card: Option<&CardController>) {
    let session = studio.session().snapshot().await;
    println!("Prompt:    {}", session.prompt());
    println!(
        "Ratio:     {} ({})",
        session.aspect_ratio(),
        session.aspect_ratio().label()
    );
    println!(
        "Reference: {}",
        if session.reference_image().is_some() { "attached" } else { "none" }
    );
    println!(
        "API key:   {}",
        if session.credential_available() { "selected" } else { "missing" }
    );
    for (n, slot) in session.slots().iter().enumerate() {
        let state = match slot.status() {
            SlotStatus::Pending => "generating".to_string(),
            SlotStatus::Ready(image) => format!("ready ({} bytes)", image.payload().len()),
            SlotStatus::Failed { reason, .. } => reason.clone(),
        };
        println!("  [{}] {}: {}", n + 1, state, slot.source_prompt());
    }
    if let Some(card) = card {
        println!("Editing cover {}: \"{}\"", card.slot_id(), card.draft());
        if let Some(error) = card.last_error() {
            println!("  last error: {error}");
        }
    }
}
