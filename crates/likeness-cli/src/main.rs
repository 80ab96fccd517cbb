use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::ImageFormat;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "likeness", about = "Likeness face verification CLI")]
struct Cli {
    /// Base URL of the likenessd daemon
    #[arg(long, global = true, env = "LIKENESS_URL", default_value = "http://127.0.0.1:5000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a captured image against a reference photo
    Verify {
        /// Captured image file (jpg, png, webp)
        #[arg(short, long)]
        image: PathBuf,
        /// Reference photo filename in the daemon's photo directory
        #[arg(short, long)]
        reference: String,
        /// Subject id, used for daemon logs
        #[arg(short, long)]
        subject: Option<String>,
    },
    /// Check that a reference photo contains a detectable face
    EncodeCheck {
        /// Reference photo filename
        photo: String,
    },
    /// Show daemon health
    Status,
    /// List reference photos and comparator configuration
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/');
    // Verification may take as long as the daemon's own time bound.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let request = match cli.command {
        Commands::Verify { image, reference, subject } => {
            let body = json!({
                "capturedImage": read_data_url(&image)?,
                "referencePhoto": reference,
                "subjectId": subject.unwrap_or_default(),
            });
            client.post(format!("{base}/api/face/verify")).json(&body)
        }
        Commands::EncodeCheck { photo } => client
            .post(format!("{base}/api/face/encode"))
            .json(&json!({ "photoFilename": photo })),
        Commands::Status => client.get(format!("{base}/health")),
        Commands::Test => client.get(format!("{base}/api/face/test")),
    };

    let response = request
        .send()
        .await
        .with_context(|| format!("likenessd not reachable at {base}"))?;
    let status = response.status();
    let body: Value = response.json().await.context("daemon returned a non-JSON body")?;

    tracing::debug!(status = status.as_u16(), "daemon replied");
    if !status.is_success() {
        eprintln!("likenessd: HTTP {status}");
    }
    println!("{}", serde_json::to_string_pretty(&body)?);

    Ok(())
}

/// Read an image file as a `data:<mime>;base64,...` string.
fn read_data_url(path: &Path) -> Result<String> {
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("unsupported image type: {}", path.display()))?;
    let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    Ok(likeness_core::codec::encode_data_url(&bytes, format))
}
