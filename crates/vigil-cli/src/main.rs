use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vigil_core::embedder::FaceEmbedder;
use vigil_hw::{Camera, FrameSource};

#[derive(Parser)]
#[command(name = "vigil", about = "Vigil face-login registry CLI")]
struct Cli {
    /// Registry base URL
    #[arg(long, default_value = "http://127.0.0.1:4000")]
    server: String,

    /// V4L2 device used when capturing an embedding
    #[arg(long, default_value = "/dev/video0")]
    device: String,

    /// Path to the descriptor ONNX model (or set VIGIL_MODEL_PATH)
    #[arg(long)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a face embedding and register it under a name
    Register {
        #[arg(short, long)]
        name: String,
        /// Read the embedding from a JSON array file instead of the camera
        #[arg(long)]
        embedding_file: Option<PathBuf>,
    },
    /// Capture a face embedding and ask the registry who it is
    Recognize {
        /// Read the embedding from a JSON array file instead of the camera
        #[arg(long)]
        embedding_file: Option<PathBuf>,
    },
    /// List registered identities
    Users,
    /// Remove a registered identity by id
    Remove { id: i64 },
    /// Probe the registry liveness endpoint
    Status,
    /// List available capture devices
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Cli { server, device, model, command } = Cli::parse();

    match command {
        Commands::Register { name, embedding_file } => {
            let embedding = obtain_embedding(embedding_file, &device, model)?;
            let body = send_json(&format!("{server}/register"), json!({
                "name": name,
                "embedding": embedding,
            }))?;
            println!("{}", body["status"].as_str().unwrap_or("registered"));
        }
        Commands::Recognize { embedding_file } => {
            let embedding = obtain_embedding(embedding_file, &device, model)?;
            let body = send_json(&format!("{server}/recognize"), json!({
                "embedding": embedding,
            }))?;
            if body["allowed"].as_bool().unwrap_or(false) {
                println!(
                    "allowed: {} (distance {:.4})",
                    body["name"].as_str().unwrap_or("?"),
                    body["distance"].as_f64().unwrap_or(f64::NAN)
                );
            } else {
                println!("not allowed");
            }
        }
        Commands::Users => {
            let body = get_json(&format!("{server}/users"))?;
            let users = body.as_array().cloned().unwrap_or_default();
            if users.is_empty() {
                println!("no identities registered");
            }
            for user in users {
                println!(
                    "{:>6}  {}",
                    user["id"].as_i64().unwrap_or(-1),
                    user["name"].as_str().unwrap_or("?")
                );
            }
        }
        Commands::Remove { id } => {
            let body = get_json(&format!("{server}/users/delete/{id}"))?;
            println!("{}", body["status"].as_str().unwrap_or("deleted"));
        }
        Commands::Status => {
            let body = get_json(&format!("{server}/test"))?;
            println!("registry reachable: {body}");
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("no capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({})", dev.path, dev.name, dev.driver);
            }
        }
    }

    Ok(())
}

/// Load an embedding from a JSON file, or capture one frame and run the
/// descriptor model over it.
fn obtain_embedding(
    embedding_file: Option<PathBuf>,
    device: &str,
    model: Option<PathBuf>,
) -> Result<Vec<f32>> {
    if let Some(path) = embedding_file {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let embedding: Vec<f32> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON number array", path.display()))?;
        return Ok(embedding);
    }

    let model_path = match model {
        Some(path) => path,
        None => match std::env::var("VIGIL_MODEL_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => bail!("descriptor model path required: pass --model or set VIGIL_MODEL_PATH"),
        },
    };

    let mut camera = Camera::open(device)?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        "camera opened"
    );
    let frame = camera.next_frame()?;

    let mut embedder = FaceEmbedder::load(&model_path.to_string_lossy())?;
    let embedding = embedder.extract(&frame.data, frame.width, frame.height)?;
    tracing::info!(dims = embedding.len(), "descriptor extracted");
    Ok(embedding)
}

fn send_json(url: &str, payload: Value) -> Result<Value> {
    parse_response(ureq::post(url).send_json(payload))
}

fn get_json(url: &str) -> Result<Value> {
    parse_response(ureq::get(url).call())
}

/// Unwrap a registry response, surfacing the server's `error` field on
/// 4xx/5xx instead of a bare status code.
fn parse_response(result: std::result::Result<ureq::Response, ureq::Error>) -> Result<Value> {
    match result {
        Ok(response) => Ok(response.into_json()?),
        Err(ureq::Error::Status(code, response)) => {
            let message = response
                .into_json::<Value>()
                .ok()
                .and_then(|body| body["error"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {code}"));
            bail!("registry refused request: {message}");
        }
        Err(e) => Err(e).context("registry unreachable"),
    }
}
