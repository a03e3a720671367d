use face_login::camera::{Camera, FrameSource, AUTO_DETECT_INDEX};
use face_login::cli::{self, KeyAction, RawMode, KEY_HELP};
use face_login::common::{system_config_file, Config, DevMode};
use face_login::core::{FaceDetector, OnnxPipeline, Orchestrator, OrchestratorSettings, SessionState};
use face_login::service::{landing_path, Command, PortalClient, SessionDriver, SessionEvent, UserId};
use face_login::storage::{CachedIdentity, IdentityStore};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

#[derive(Parser)]
#[command(name = "face-login")]
#[command(about = "Camera face login with liveness checking")]
struct Cli {
    /// Enable development mode (identity cache and captures stay in ./dev_data)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file (default: configs/face-login.toml, then the system config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cameras and show which one auto-detect would pick
    DetectCamera,
    /// Capture one frame and save it
    TestCamera,
    /// Capture one frame and save an annotated detection image
    TestDetection,
    /// Interactive face login
    Login {
        /// Greet this user instead of the cached one
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Register a face photo for an existing user
    Register {
        #[arg(short, long)]
        user_id: String,
    },
}

enum SessionMode {
    Login { email: Option<String> },
    Register { user_id: UserId },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let dev_mode = DevMode::new(cli.dev)?;

    match cli.command {
        Commands::DetectCamera => detect_camera()?,
        Commands::TestCamera => {
            println!("Testing camera...");
            test_camera(&load_config(cli.config.as_deref())?, &dev_mode)?;
        }
        Commands::TestDetection => {
            println!("Testing face detection...");
            test_detection(&load_config(cli.config.as_deref())?, &dev_mode)?;
        }
        Commands::Login { email } => {
            let config = load_config(cli.config.as_deref())?;
            run_session(config, &dev_mode, SessionMode::Login { email })?;
        }
        Commands::Register { user_id } => {
            let config = load_config(cli.config.as_deref())?;
            let user_id = UserId::parse(&user_id);
            run_session(config, &dev_mode, SessionMode::Register { user_id })?;
        }
    }

    Ok(())
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config = match explicit {
        Some(path) => Config::load_from_path(path)?,
        None if Path::new("configs/face-login.toml").exists() => Config::load()?,
        None => Config::load_from_path(&system_config_file())?,
    };
    Ok(config)
}

fn detect_camera() -> Result<()> {
    println!("🔍 Detecting available cameras...\n");

    let cameras = Camera::list_all_cameras()?;
    if cameras.is_empty() {
        println!("❌ No cameras found!");
        println!("\nTroubleshooting:");
        println!("  1. Check if a camera is connected");
        println!("  2. Ensure you have permission to access /dev/video*");
        return Ok(());
    }

    for camera in &cameras {
        println!("📷 /dev/video{}: {}", camera.index, camera.name);
        println!("   formats: {}", camera.formats.join(", "));
        if !camera.can_capture {
            println!("   (no VIDEO_CAPTURE capability)");
        }
    }

    println!();
    let selected = Camera::detect_color_camera()?;
    println!("✅ Auto-detect (device_index = {}) would use /dev/video{}", AUTO_DETECT_INDEX, selected);
    println!("\n📝 To pin a camera, set in the config:");
    println!("   [camera]");
    println!("   device_index = {}", selected);
    Ok(())
}

fn test_camera(config: &Config, dev_mode: &DevMode) -> Result<()> {
    let mut camera = Camera::new(&config.camera);
    camera.start()?;
    let frame = camera.capture_blocking()?;
    camera.stop();

    let save_path = dev_mode.get_capture_path("test_capture");
    frame.to_image()?.save(&save_path)?;
    println!("Saved {}x{} test image to {:?}", frame.width(), frame.height(), save_path);
    Ok(())
}

fn test_detection(config: &Config, dev_mode: &DevMode) -> Result<()> {
    let detector = FaceDetector::new(config)?;
    let mut camera = Camera::new(&config.camera);
    camera.start()?;

    println!("Capturing frame from camera {}...", config.camera.device_index);
    let frame = camera.capture_blocking()?;
    camera.stop();
    let image = frame.to_image()?;

    let save_path = dev_mode.get_capture_path("detection_test");
    image.save(&save_path)?;
    println!("Saved original image to {:?}", save_path);

    let (candidates, accepted) = detector.detect_debug(&image)?;
    println!(
        "Found {} face(s) above threshold {}",
        accepted.len(),
        config.detector.detection_confidence
    );
    for (i, face) in accepted.iter().enumerate() {
        println!("  Face {}: confidence {:.3}", i + 1, face.confidence);
    }

    let debug_path = dev_mode.get_debug_path("detection_annotated");
    cli::annotate_detections(&image, &candidates, &accepted).save(&debug_path)?;
    println!("\nSaved annotated image to: {:?}", debug_path);
    Ok(())
}

fn run_session(config: Config, dev_mode: &DevMode, mode: SessionMode) -> Result<()> {
    let identity_store = IdentityStore::new_with_dev_mode(dev_mode)?;
    let pipeline = OnnxPipeline::new(&config)?;
    let camera = Camera::new(&config.camera);
    let client = Arc::new(PortalClient::new(&config)?);

    let mut orchestrator = Orchestrator::new(camera, pipeline, OrchestratorSettings::from(&config), Instant::now());
    let greeting = match &mode {
        SessionMode::Login { email: Some(email) } => Some(email.clone()),
        SessionMode::Login { email: None } => identity_store.load().and_then(|identity| identity.email),
        SessionMode::Register { .. } => None,
    };
    if let Some(email) = greeting {
        orchestrator.welcome(&email);
    }

    let tick_interval = Duration::from_millis(config.session.tick_interval_ms);
    let driver = SessionDriver::new(orchestrator, client.clone(), client, tick_interval);

    let (command_tx, command_rx) = mpsc::channel::<Command>(16);
    let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    command_tx.blocking_send(Command::StartCamera)?;
    if let SessionMode::Register { user_id } = mode {
        command_tx.blocking_send(Command::ArmRegistration(user_id))?;
    }

    let raw_mode = match RawMode::enable() {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::warn!("Keyboard input unavailable: {}", e);
            None
        }
    };
    cli::print_line(KEY_HELP);

    let key_reader = {
        let shutdown_tx = shutdown_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        std::thread::spawn(move || read_keys(command_tx, shutdown_tx, shutdown_rx))
    };

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let default_role = config.roles.default_role.clone();
    runtime.block_on(async {
        let (_orchestrator, ()) = tokio::join!(
            driver.run(command_rx, event_tx, shutdown_rx),
            print_events(event_rx, &identity_store, &default_role, &shutdown_tx),
        );
    });

    let _ = shutdown_tx.send(true);
    if key_reader.join().is_err() {
        tracing::warn!("Key reader thread panicked");
    }
    drop(raw_mode);
    Ok(())
}

fn read_keys(commands: mpsc::Sender<Command>, shutdown_tx: Arc<watch::Sender<bool>>, shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        match cli::poll_action(Duration::from_millis(100)) {
            Ok(Some(KeyAction::Send(command))) => {
                if commands.blocking_send(command).is_err() {
                    break;
                }
            }
            Ok(Some(KeyAction::Quit)) => {
                let _ = shutdown_tx.send(true);
                break;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Keyboard read failed: {}", e);
                break;
            }
        }
    }
}

async fn print_events(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    identity_store: &IdentityStore,
    default_role: &str,
    shutdown_tx: &watch::Sender<bool>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Status { state, message } => {
                cli::print_line(&format!("[{}] {}", state_label(&state), message));
            }
            SessionEvent::LoggedIn(user) => {
                if let Err(e) = identity_store.save(&CachedIdentity::from_user(&user)) {
                    tracing::warn!("Could not cache identity: {}", e);
                }
                let role = user.role.as_deref().unwrap_or(default_role);
                cli::print_line(&format!(
                    "✅ Logged in as {} ({}), continue at {}",
                    user.email.as_deref().unwrap_or("unknown user"),
                    role,
                    landing_path(role)
                ));
                let _ = shutdown_tx.send(true);
            }
        }
    }
}

fn state_label(state: &SessionState) -> &'static str {
    match state {
        SessionState::Idle => "idle",
        SessionState::CameraActive => "camera",
        SessionState::Authenticating => "verifying",
        SessionState::Registering { .. } => "register",
        SessionState::Succeeded { .. } => "done",
        SessionState::Failed => "error",
    }
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
