use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "faceid", about = "faceid face registration and authentication CLI")]
struct Cli {
    /// Base URL of the faceidd server
    #[arg(long, env = "FACEID_SERVER", default_value = "http://127.0.0.1:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a face under a name
    Register {
        /// Name to register the face under
        #[arg(short, long)]
        name: String,
        /// Image file containing the face
        image: PathBuf,
    },
    /// Authenticate a face against registered faces
    Authenticate {
        /// Image file containing the face
        image: PathBuf,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.server.trim_end_matches('/');

    let request = match cli.command {
        Commands::Register { name, image } => {
            let form = Form::new().text("name", name).part("image", image_part(&image).await?);
            client.post(format!("{base}/upload")).multipart(form)
        }
        Commands::Authenticate { image } => {
            let form = Form::new().part("image", image_part(&image).await?);
            client.post(format!("{base}/authenticate")).multipart(form)
        }
        Commands::Status => client.get(format!("{base}/status")),
    };

    let response = request
        .send()
        .await
        .with_context(|| format!("contacting {base}"))?;
    let status = response.status();
    tracing::debug!(%status, "response received");

    let body: serde_json::Value = response.json().await.context("decoding response")?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        bail!("request failed with {status}");
    }
    Ok(())
}

async fn image_part(path: &Path) -> Result<Part> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(Part::bytes(bytes).file_name(file_name))
}
