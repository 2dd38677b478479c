//! Pi-cam-recorder binary: saves camera frames to video files on command.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pi_cam_recorder::cli::CliArgs;
use pi_cam_recorder::ffmpeg::FfmpegEncoder;
use pi_cam_recorder::mock::MockDevice;
use pi_cam_recorder::traits::Result;
use pi_cam_recorder::{CameraDevice, FrameSource, Recorder, StdoutSink, V4L2Device};
use tracing::{error, info, warn};

fn main() {
    let args = CliArgs::parse_args();

    // RUST_LOG wins over --log-level. Logs go to stderr, status reports to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(&args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<()> {
    let config = args.load_config()?;
    let format = args.capture_format()?;

    let ffmpeg = args.ffmpeg.clone();
    let recorder = Arc::new(Recorder::spawn(
        &config,
        move || FfmpegEncoder::new(ffmpeg.clone()),
        Arc::new(StdoutSink),
    )?);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(err) = ctrlc::set_handler(move || {
        info!("Shutdown signal received");
        r.store(false, Ordering::SeqCst);
    }) {
        error!("Failed to set signal handler: {err}");
    }

    spawn_control_thread(Arc::clone(&recorder))?;
    if args.autostart {
        recorder.start()?;
    }

    let result = if args.mock {
        let mut device = MockDevice::new();
        let actual = device.set_format(&format)?;
        let interval = Duration::from_secs_f64(1.0 / config.encode.fps);
        let mut stream = device.create_stream(4)?.with_frame_interval(interval);
        info!("Capturing {}x{} from mock camera", actual.width, actual.height);
        acquire(&mut stream, &recorder, &running)
    } else {
        let mut device = V4L2Device::open(args.device)?;
        info!(
            "Device: {} ({})",
            device.capabilities().card,
            device.capabilities().driver
        );
        let actual = device.set_format(&format)?;
        info!(
            "Capturing {}x{} {}",
            actual.width, actual.height, actual.fourcc
        );
        let mut stream = device.create_stream(4)?;
        acquire(&mut stream, &recorder, &running)
    };

    recorder.shutdown();
    result
}

/// Acquisition loop: one frame per cycle until Ctrl-C.
fn acquire<S: FrameSource>(
    stream: &mut S,
    recorder: &Recorder,
    running: &AtomicBool,
) -> Result<()> {
    while running.load(Ordering::SeqCst) {
        let frame = stream.next_frame()?;
        recorder.process(frame);
    }
    Ok(())
}

/// Read `start`/`stop` commands from stdin, one per line.
fn spawn_control_thread(recorder: Arc<Recorder>) -> Result<()> {
    thread::Builder::new()
        .name("control".to_owned())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("Control channel closed: {err}");
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "help" {
                    print!("{}", Recorder::supported_commands());
                    continue;
                }
                if let Err(err) = recorder.handle_command(line) {
                    error!("{err}");
                    println!("ERR {err}");
                }
            }
        })?;
    Ok(())
}
