use std::{
    io::Read as _,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context as _;
use clap::{ArgAction, Parser, ValueEnum};
use voxreel::{
    BackgroundSource, CancelToken, CaptionMode, CharacterArt, ElevenLabsSynthesizer, ErrorKind,
    FfmpegSink,
    Pipeline, PipelineConfig, PipelineError, ReelError, RenderedOutput, SpeechSynthesizer,
    SynthesisMode, ToneSynthesizer,
};

#[derive(Parser, Debug)]
#[command(name = "voxreel", version, about = "Turn text into a narrated talking-character video")]
struct Cli {
    /// Text to narrate; `-` reads it from stdin.
    text: String,

    /// Output video path (the container is chosen from the extension).
    #[arg(short, long)]
    out: PathBuf,

    /// Pipeline config JSON; command-line flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Provider voice id.
    #[arg(long)]
    voice: Option<String>,

    /// Background image or video, or a directory to pick one from.
    #[arg(long)]
    background: Option<PathBuf>,

    /// Selects the background when `--background` is a directory.
    #[arg(long)]
    seed: Option<u64>,

    /// Directory holding `closed.png`, `open.png` and `wide.png`.
    #[arg(long)]
    character_dir: Option<PathBuf>,

    /// Caption font file (TTF/OTF).
    #[arg(long)]
    font: Option<PathBuf>,

    #[arg(long, value_enum)]
    captions: Option<CaptionChoice>,

    /// One TTS request per segment instead of one for the whole text.
    #[arg(long)]
    per_segment: bool,

    /// Use the built-in tone synthesizer instead of the network provider.
    #[arg(long)]
    offline: bool,

    #[arg(long, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CaptionChoice {
    Segments,
    Words,
}

fn main() -> ExitCode {
    // A missing `.env` is fine; real environment variables win over it.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);

    match run(cli, cancel) {
        Ok(output) => {
            println!(
                "wrote {} ({} frames, {:.2}s, {}x{})",
                output.path.display(),
                output.frames,
                output.duration.as_secs_f64(),
                output.resolution.width,
                output.resolution.height
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            let (kind, stage) = classify(&err);
            match stage {
                Some(stage) => eprintln!("error [{kind}] during {stage}: {err}"),
                None => eprintln!("error [{kind}]: {err:#}"),
            }
            ExitCode::from(exit_code(kind))
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// First Ctrl-C cancels the run so temporary files get cleaned up; a second one exits at once.
fn install_interrupt_handler(cancel: &CancelToken) {
    let token = cancel.clone();
    let installed = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        eprintln!("interrupted; cleaning up (press Ctrl-C again to quit immediately)");
        token.cancel();
    });
    if let Err(err) = installed {
        tracing::warn!(error = %err, "failed to install Ctrl-C handler");
    }
}

fn run(cli: Cli, cancel: CancelToken) -> anyhow::Result<RenderedOutput> {
    let text = if cli.text == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read text from stdin")?;
        buf
    } else {
        cli.text.clone()
    };

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    apply_overrides(&mut config, &cli)?;

    let synth: Box<dyn SpeechSynthesizer> = if cli.offline {
        Box::new(ToneSynthesizer::default())
    } else {
        Box::new(ElevenLabsSynthesizer::new(&config.provider)?)
    };

    let mut pipeline = Pipeline::new(config, synth.as_ref())?.with_cancel_token(cancel);
    let mut sink = FfmpegSink::new();
    let report = pipeline.run(&text, &cli.out, &mut sink)?;
    Ok(report.output)
}

fn apply_overrides(config: &mut PipelineConfig, cli: &Cli) -> anyhow::Result<()> {
    if let Some(voice) = &cli.voice {
        config.voice.voice_id = voice.clone();
    }
    if let Some(key) = &cli.api_key {
        config.provider.api_key = Some(key.clone());
    }
    if let Some(path) = &cli.background {
        let seed = cli.seed.unwrap_or_else(time_seed);
        config.scene.background = background_from_path(path, seed)?;
    }
    if let Some(dir) = &cli.character_dir {
        config.scene.character = CharacterArt::from_dir(dir);
    }
    if let Some(font) = &cli.font {
        config.scene.caption_style.font_path = Some(font.clone());
    }
    if let Some(choice) = cli.captions {
        config.scene.captions = match choice {
            CaptionChoice::Segments => CaptionMode::Segments,
            CaptionChoice::Words => CaptionMode::Words,
        };
    }
    if cli.per_segment {
        config.synthesis.mode = SynthesisMode::PerSegment;
    }
    Ok(())
}

fn background_from_path(path: &Path, seed: u64) -> anyhow::Result<BackgroundSource> {
    let file = if path.is_dir() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
            .with_context(|| format!("failed to list backgrounds in '{}'", path.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && media_kind(p).is_some())
            .collect();
        if entries.is_empty() {
            return Err(ReelError::validation(format!(
                "no image or video files in '{}'",
                path.display()
            ))
            .into());
        }
        entries.sort();
        let idx = (seed % entries.len() as u64) as usize;
        entries.swap_remove(idx)
    } else {
        path.to_path_buf()
    };

    match media_kind(&file) {
        Some(MediaKind::Image) => Ok(BackgroundSource::Image { path: file }),
        Some(MediaKind::Video) | None => Ok(BackgroundSource::Video { path: file }),
    }
}

enum MediaKind {
    Image,
    Video,
}

fn media_kind(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "bmp" | "webp" => Some(MediaKind::Image),
        "mp4" | "mov" | "mkv" | "webm" | "avi" | "m4v" => Some(MediaKind::Video),
        _ => None,
    }
}

fn time_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn classify(err: &anyhow::Error) -> (ErrorKind, Option<String>) {
    if let Some(e) = err.downcast_ref::<PipelineError>() {
        return (e.kind(), Some(e.stage.to_string()));
    }
    if let Some(e) = err.downcast_ref::<ReelError>() {
        return (e.kind(), None);
    }
    (ErrorKind::Other, None)
}

fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Validation => 2,
        ErrorKind::SynthesisTransient | ErrorKind::SynthesisFatal => 3,
        ErrorKind::Timeline => 4,
        ErrorKind::Render => 5,
        ErrorKind::Cancelled => 130,
        ErrorKind::Other => 1,
    }
}
