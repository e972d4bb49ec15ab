use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate_client::HttpBackend;
use facegate_core::enroll::Enrollment;
use facegate_core::{compare, selection};
use facegate_core::{CapturedFrame, Comparison, FaceBackend, IdentityRef, PollOutcome, Poller};
use facegate_hw::frame::load_image_file;
use facegate_hw::{Camera, CameraError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod notifier;
mod prompt;

use config::Config;
use engine::{CaptureHandle, EngineError};
use notifier::ConsoleNotifier;
use prompt::{Ask, Console};

#[derive(Parser)]
#[command(name = "facegate", about = "Face enrollment and verification client")]
struct Cli {
    /// TOML config file (default: $FACEGATE_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the camera until your face matches an enrolled identity
    Verify {
        /// Identity to verify against; prompts from the enrolled list if omitted
        #[arg(short, long)]
        id: Option<String>,
    },
    /// Capture a face and enroll it
    Enroll {
        /// Upload this image file instead of using the camera
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Compare two faces once
    Compare {
        /// First image file (captured from the camera if omitted)
        #[arg(long)]
        first: Option<PathBuf>,
        /// Second image file (captured from the camera if omitted)
        #[arg(long)]
        second: Option<PathBuf>,
    },
    /// List enrolled identities
    List,
    /// List V4L2 capture devices
    Devices,
    /// Run camera diagnostics
    Test {
        /// Number of frames to sample
        #[arg(short, long, default_value_t = 5)]
        frames: usize,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(base_url = %config.base_url, device = %config.camera_device, "config loaded");

    let mut console = Console::new();

    match cli.command {
        Commands::Verify { id } => verify(&config, id, &mut console).await,
        Commands::Enroll { image } => enroll(&config, image.as_deref(), &mut console).await,
        Commands::Compare { first, second } => {
            compare_faces(&config, first.as_deref(), second.as_deref(), &mut console).await
        }
        Commands::List => list(&config).await,
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Test { frames } => test_camera(&config, frames).await,
    }
}

fn backend(config: &Config) -> Result<HttpBackend> {
    HttpBackend::new(
        &config.base_url,
        config.compare_base_url.as_deref(),
        config.request_timeout(),
    )
    .context("failed to create backend client")
}

/// Open the camera. A permission denial is logged and yields `None`, leaving
/// the caller in its pre-capture state.
fn open_camera(config: &Config) -> Result<Option<CaptureHandle>> {
    match engine::spawn_capture_engine(&config.camera_device, config.warmup_frames) {
        Ok(handle) => Ok(Some(handle)),
        Err(EngineError::Camera(CameraError::PermissionDenied(device))) => {
            tracing::error!(device = %device, "camera permission denied");
            Ok(None)
        }
        Err(err) => Err(err).with_context(|| format!("failed to open {}", config.camera_device)),
    }
}

async fn choose_identity<B: FaceBackend>(
    backend: &B,
    console: &mut Console,
) -> Result<Option<IdentityRef>> {
    let ids = selection::load_identities(backend).await;
    if ids.is_empty() {
        println!("No enrolled identities available");
        return Ok(None);
    }

    println!("Enrolled identities:");
    for (i, id) in ids.iter().enumerate() {
        println!("  {:>2}) {id}", i + 1);
    }
    let answer = console.ask("Select an identity (number or id): ").await?;
    Ok(selection::select(&ids, &answer))
}

async fn verify(config: &Config, id: Option<String>, console: &mut Console) -> Result<ExitCode> {
    let backend = Arc::new(backend(config)?);

    let selection = match id {
        Some(id) => Some(IdentityRef::new(id)),
        None => choose_identity(backend.as_ref(), console).await?,
    };
    if selection.is_none() {
        println!("No identity selected; camera not opened");
        return Ok(ExitCode::FAILURE);
    }

    let Some(camera) = open_camera(config)? else {
        return Ok(ExitCode::FAILURE);
    };

    let poller = Poller::new(
        Arc::new(camera),
        backend,
        Arc::new(ConsoleNotifier),
        config.poll_config(),
    );
    let handle = poller.start(selection)?;
    println!("Verifying, look at the camera (Ctrl-C to stop)");

    let canceller = handle.canceller();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            canceller.cancel();
        }
    });

    let report = handle.wait().await.context("poll session failed")?;
    interrupt.abort();

    tracing::info!(
        session_id = %report.session_id,
        outcome = ?report.outcome,
        attempts = report.attempts,
        misses = report.misses,
        "verification finished"
    );
    Ok(match report.outcome {
        PollOutcome::Verified => {
            println!("Verified {} after {} attempt(s)", report.identity, report.attempts);
            ExitCode::SUCCESS
        }
        PollOutcome::Exhausted => {
            println!(
                "Not verified: {} of {} attempt(s) did not match",
                report.misses, report.attempts
            );
            ExitCode::FAILURE
        }
        PollOutcome::Cancelled => {
            println!("Verification cancelled");
            ExitCode::from(130)
        }
    })
}

async fn enroll(config: &Config, image: Option<&Path>, console: &mut Console) -> Result<ExitCode> {
    let backend = backend(config)?;
    let mut enrollment = Enrollment::new();

    match image {
        Some(path) => enrollment.accept(load_image_file(path)?)?,
        None => {
            let Some(camera) = open_camera(config)? else {
                return Ok(ExitCode::FAILURE);
            };
            loop {
                console.ask("Press Enter to capture").await?;
                enrollment.capture(&camera).await?;
                if let Some(frame) = enrollment.captured() {
                    println!("Captured {}x{} frame", frame.width, frame.height);
                }
                if prompt::wants_retake(console, "Add this face?").await? {
                    enrollment.retake();
                    continue;
                }
                break;
            }
        }
    }

    match enrollment.submit(&backend, &ConsoleNotifier).await {
        Ok(id) => {
            println!("{id}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::debug!(error = %err, "enrollment failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn compare_faces(
    config: &Config,
    first: Option<&Path>,
    second: Option<&Path>,
    console: &mut Console,
) -> Result<ExitCode> {
    let backend = backend(config)?;

    let camera = if first.is_none() || second.is_none() {
        match open_camera(config)? {
            Some(camera) => Some(camera),
            None => return Ok(ExitCode::FAILURE),
        }
    } else {
        None
    };

    let first = obtain_frame(first, camera.as_ref(), console, "first").await?;
    let second = obtain_frame(second, camera.as_ref(), console, "second").await?;

    Ok(
        match compare::compare(&backend, &first, &second, &ConsoleNotifier).await {
            Ok(Comparison::Match) => ExitCode::SUCCESS,
            Ok(_) | Err(_) => ExitCode::FAILURE,
        },
    )
}

async fn obtain_frame(
    path: Option<&Path>,
    camera: Option<&CaptureHandle>,
    console: &mut Console,
    label: &str,
) -> Result<CapturedFrame> {
    if let Some(path) = path {
        return Ok(load_image_file(path)?);
    }
    let camera = camera.context("camera not open")?;
    prompt::capture_confirmed(camera, console, label).await
}

async fn list(config: &Config) -> Result<ExitCode> {
    let backend = backend(config)?;
    let ids = selection::load_identities(&backend).await;
    if ids.is_empty() {
        println!("No enrolled identities");
    }
    for id in ids {
        println!("{id}");
    }
    Ok(ExitCode::SUCCESS)
}

async fn test_camera(config: &Config, frames: usize) -> Result<ExitCode> {
    println!("Running camera diagnostics on {}", config.camera_device);
    let Some(camera) = open_camera(config)? else {
        println!("Permission denied; check membership of the video group");
        return Ok(ExitCode::FAILURE);
    };

    for i in 0..frames {
        let frame = camera.capture_raw().await?;
        println!(
            "frame {i}: {}x{} seq={} brightness={:.1}{}",
            frame.width,
            frame.height,
            frame.sequence,
            frame.avg_brightness(),
            if frame.is_dark() { " (dark)" } else { "" }
        );
    }
    Ok(ExitCode::SUCCESS)
}
