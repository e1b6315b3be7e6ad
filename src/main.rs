use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use secure_home::config::{self, SessionConfig, StoredConfig, DEFAULT_CONFIG_FILE};
use secure_home::console::Console;
use secure_home::detection_log::{DetectionLog, DEFAULT_LOG_FILE};
use secure_home::face::L2Matcher;
use secure_home::gallery;
use secure_home::logging;
use secure_home::notify::{Notifier, TwilioCredentials, TwilioNotifier, UnconfiguredNotifier};
use secure_home::surveillance::{self, Display, Headless};
use secure_home::vision::{self, CameraStream, OpenCvFaceEngine, Window, SURVEILLANCE_WINDOW};
use secure_home::wizard::Wizard;

const MAX_CAMERA_PROBES: u32 = 16;

#[derive(Parser)]
#[command(name = "secure-home", version)]
#[command(about = "Face surveillance for home entrances with SMS intruder alerts")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive first-run setup
    Init {
        /// Reset the existing configuration.
        #[arg(long)]
        reset: bool,
    },

    /// Start the Secure Home system
    Start {
        /// Run without a preview window
        #[arg(long)]
        headless: bool,
        #[arg(long, default_value = DEFAULT_LOG_FILE)]
        log_file: PathBuf,
    },

    /// List camera indices that deliver frames
    Cameras,

    /// Capture a reference face into the gallery
    Enroll {
        name: String,
        #[arg(long)]
        camera: Option<u32>,
    },
}

fn main() {
    dotenvy::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let console = Console::detect();

    if let Err(e) = run(cli, &console) {
        console.error(&format!("An error occurred: {:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli, console: &Console) -> Result<()> {
    match cli.command {
        Command::Init { reset } => init(&cli.config, reset, console),
        Command::Start { headless, log_file } => start(&cli.config, headless, log_file, console),
        Command::Cameras => {
            let found = vision::list_cameras(MAX_CAMERA_PROBES);
            if found.is_empty() {
                console.warning("No working camera found.");
            }
            for id in found {
                console.success(&format!("Camera (ID: {}) is available!", id));
            }
            Ok(())
        }
        Command::Enroll { name, camera } => enroll(&cli.config, &name, camera, console),
    }
}

fn init(path: &Path, reset: bool, console: &Console) -> Result<()> {
    console.title("Welcome to Secure Home!!!");
    console.regular(
        "Face surveillance for home entrances: residents are recognized,\n\
         strangers who linger trigger an SMS alert.\n",
    );
    console.regular(
        "Key Features:\n\n\
         - Real-time face recognition on a local camera feed\n\
         - Gallery of known residents from a folder of photos\n\
         - SMS notification on persistent unknown presence\n\
         - Visual monitoring interface\n",
    );

    console.info("Check for existing configuration...");
    if !config::needs_setup(path, reset)? {
        console.info("Existing configuration found. Use --reset to start fresh.");
        return Ok(());
    }
    if reset {
        console.warning("Resetting configuration...");
    } else {
        console.warning("No configuration found, create a new one...");
    }

    let probe = |id: u32| vision::camera_available(id);
    let stdin = io::stdin();
    let stored = Wizard::new(stdin.lock(), io::stdout(), *console, &probe)
        .run(StoredConfig::default())?;

    console.info("Saving config...");
    config::save(path, &stored)?;
    console.success("Configuration complete!");
    Ok(())
}

fn load_session(path: &Path) -> Result<SessionConfig> {
    let Some(stored) = config::load(path)? else {
        bail!("No configuration found. Please run 'init' first.");
    };
    Ok(SessionConfig::try_from(stored)?)
}

fn notifier() -> Box<dyn Notifier> {
    match TwilioCredentials::from_env().and_then(TwilioNotifier::new) {
        Ok(n) => Box::new(n),
        Err(e) => {
            warn!("SMS alerts unavailable: {}", e);
            Box::new(UnconfiguredNotifier)
        }
    }
}

fn start(path: &Path, headless: bool, log_file: PathBuf, console: &Console) -> Result<()> {
    let cfg = load_session(path)?;

    console.title("Starting Secure Home system...");
    console.info(&format!("Using camera ID: {}", cfg.camera_id));
    console.info(&format!("Acceptable faces directory: {}", cfg.gallery_path.display()));
    if !cfg.alerts_enabled() {
        console.warning("No alert phone number configured; SMS alerts are off.");
    }

    let engine = OpenCvFaceEngine::new(&cfg.detector_model, &cfg.recognizer_model)?;
    let display: Box<dyn Display> = if headless {
        Box::new(Headless)
    } else {
        Box::new(Window::open(SURVEILLANCE_WINDOW)?)
    };

    console.info(&format!("Surveillance is active. {}", display.stop_hint()));
    let summary = surveillance::start(
        &cfg,
        engine,
        L2Matcher::default(),
        CameraStream::open,
        display,
        notifier(),
        DetectionLog::new(log_file),
    )?;

    console.success(&format!(
        "Surveillance ended. {} frames, {} dropped, {} alerts sent, {} failed.",
        summary.frames, summary.dropped_frames, summary.alerts_sent, summary.alerts_failed
    ));
    Ok(())
}

fn enroll(path: &Path, name: &str, camera: Option<u32>, console: &Console) -> Result<()> {
    let cfg = load_session(path)?;
    let dest = gallery::reference_image_path(&cfg.gallery_path, name)?;
    std::fs::create_dir_all(&cfg.gallery_path)
        .with_context(|| format!("creating {}", cfg.gallery_path.display()))?;

    console.info("Press SPACE to capture, 'q' to cancel.");
    if vision::capture_reference(camera.unwrap_or(cfg.camera_id), &dest)? {
        console.success(&format!("Saved {} as {}", name, dest.display()));
    } else {
        console.warning("Enrollment cancelled.");
    }
    Ok(())
}
