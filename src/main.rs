use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use nova_studio::credentials::{CredentialProvider, EnvCredentialProvider, StaticCredentialProvider};
use nova_studio::media::{self, DataUrl};
use nova_studio::models::{AspectRatio, Config, GenerationRequest, MediaResult, SourceImage};
use nova_studio::poller::CancelToken;
use nova_studio::GenerationGateway;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ANALYSIS_PROMPT: &str = "Describe what is happening in this frame.";

#[derive(Debug, Parser)]
#[command(name = "nova-studio")]
#[command(about = "Generate, edit, animate and analyze media with hosted AI models")]
struct CliArgs {
    /// API key; defaults to GEMINI_API_KEY or API_KEY from the environment.
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Directory generated media is written to.
    #[arg(long, global = true, default_value = "output")]
    out: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a square still image from a prompt.
    Image { prompt: String },
    /// Generate a video from a prompt.
    Video {
        prompt: String,
        #[arg(long, default_value = "16:9")]
        aspect_ratio: AspectRatio,
    },
    /// Animate a still image. The prompt is optional.
    Animate {
        image: PathBuf,
        #[arg(default_value = "")]
        prompt: String,
        #[arg(long, default_value = "16:9")]
        aspect_ratio: AspectRatio,
    },
    /// Edit an image with a free-text instruction.
    Edit { image: PathBuf, instruction: String },
    /// Analyze a captured video frame.
    Analyze {
        frame: PathBuf,
        #[arg(default_value = DEFAULT_ANALYSIS_PROMPT)]
        prompt: String,
    },
}

fn require_prompt(prompt: &str, what: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        bail!("Please enter {}.", what);
    }
    Ok(())
}

async fn build_request(command: Command) -> Result<GenerationRequest> {
    Ok(match command {
        Command::Image { prompt } => {
            require_prompt(&prompt, "a prompt")?;
            GenerationRequest::image(prompt)
        }
        Command::Video {
            prompt,
            aspect_ratio,
        } => {
            require_prompt(&prompt, "a prompt")?;
            GenerationRequest::video(prompt, aspect_ratio)
        }
        Command::Animate {
            image,
            prompt,
            aspect_ratio,
        } => GenerationRequest::animate(prompt, load_image(&image).await?, aspect_ratio),
        Command::Edit { image, instruction } => {
            require_prompt(&instruction, "an editing instruction")?;
            GenerationRequest::edit(instruction, load_image(&image).await?)
        }
        Command::Analyze { frame, prompt } => {
            GenerationRequest::analyze(prompt, load_image(&frame).await?)
        }
    })
}

async fn load_image(path: &Path) -> Result<SourceImage> {
    SourceImage::from_path(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))
}

fn output_path(out_dir: &Path, kind: &str, mime_type: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    out_dir.join(format!(
        "nova-{}-{}.{}",
        kind,
        stamp,
        media::extension_for_mime(mime_type)
    ))
}

async fn write_result(result: MediaResult, out_dir: &Path) -> Result<()> {
    match result {
        MediaResult::DataUrl(url) => {
            let data = DataUrl::parse(&url)?;
            tokio::fs::create_dir_all(out_dir).await?;
            let path = output_path(out_dir, "image", &data.mime_type);
            tokio::fs::write(&path, &data.bytes).await?;
            info!("Saved image to {}", path.display());
        }
        MediaResult::Blob(mut object_url) => {
            let blob = object_url
                .blob()
                .context("Video blob was released before it could be saved")?;
            tokio::fs::create_dir_all(out_dir).await?;
            let path = output_path(out_dir, "video", &blob.mime_type);
            tokio::fs::write(&path, &blob.bytes).await?;
            object_url.release();
            info!("Saved video to {}", path.display());
        }
        MediaResult::Text(text) => println!("{}", text),
    }
    Ok(())
}

async fn run(args: CliArgs) -> Result<()> {
    let config = Config::from_env()?;
    let credentials: Arc<dyn CredentialProvider> = match args.api_key {
        Some(key) => Arc::new(StaticCredentialProvider::new(key)),
        None => Arc::new(EnvCredentialProvider::new()),
    };
    let gateway = GenerationGateway::gemini(config, credentials);

    let request = build_request(args.command).await?;

    let cancel = CancelToken::new();
    let progress = |percentage: f64, message: &str| {
        info!("[{:>3.0}%] {}", percentage, message);
    };
    let result = tokio::select! {
        result = gateway.run(request, &progress, &cancel) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; abandoning request");
            return Err(nova_studio::Error::Cancelled.into());
        }
    };
    write_result(result, &args.out).await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nova_studio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
