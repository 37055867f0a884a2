use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use stls::config::{AppConfig, RootData, RunMode};
use stls::zone_file::load_zones;
use stls::zones::ZoneSet;

#[derive(Parser)]
#[command(name = "stls", version)]
#[command(about = "Traffic zone monitor: YOLO vehicle detection, zone queuing, relay control")]
struct Cli {
    /// Root data file (`key: value` per line)
    #[arg(short, long, default_value = "root_data.txt")]
    config: PathBuf,

    /// Without a command, `write_points_mode` in the root file decides.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Start the monitoring loop
    Run,

    /// Record zone polygons from the camera preview
    WritePoints,

    /// Print the zones scaled to the configured frame size
    Zones {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let root = RootData::read(&cli.config)?;
    let cfg = AppConfig::from_root_data(&root, true)
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;

    stls::logging::init_logging(&cfg.log_settings());
    info!("{}", root);

    let command = match cli.command {
        Some(c) => c,
        None => match cfg.run_mode()? {
            RunMode::WritePoints => Command::WritePoints,
            RunMode::Monitor => Command::Run,
        },
    };

    match command {
        Command::Run => vision::run_monitor(&cfg).await?,
        Command::WritePoints => vision::write_points(&cfg)?,
        Command::Zones { json } => {
            let zones = load_zones(&cfg.zones_file_path, cfg.frame_width, cfg.frame_height)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&zones)?);
            } else {
                print_zones(&zones);
            }
        }
    }
    Ok(())
}

fn print_zones(zones: &ZoneSet) {
    println!("Zones at {}x{} ({} total)", zones.frame_width, zones.frame_height, zones.len());
    println!("{}", "─".repeat(60));
    for zone in zones.iter() {
        let points = zone
            .points
            .iter()
            .map(|p| format!("({}, {})", p.x, p.y))
            .collect::<Vec<_>>()
            .join(", ");
        println!("{:>3}: {}", zone.id, points);
    }
}

#[cfg(feature = "vision")]
mod vision {
    use anyhow::Result;
    use tracing::info;

    use stls::authoring::AuthoringSession;
    use stls::authoring_ui::run_authoring;
    use stls::camera::CameraStream;
    use stls::config::AppConfig;
    use stls::detection::ClassList;
    use stls::error::ensure_exists;
    use stls::monitor::{HeadlessSink, Monitor, MonitorSettings, RunSummary};
    use stls::output::ActuationChannel;
    use stls::overlay::OpenCvSink;
    use stls::processor::FrameProcessor;
    use stls::zone_file::{load_zones, ZoneFileWriter};
    use stls::zones::ZoneSet;
    use stls::yolo::YoloDetector;

    pub async fn run_monitor(cfg: &AppConfig) -> Result<()> {
        ensure_exists("weight", &cfg.weight_file_path)?;
        ensure_exists("class list", &cfg.class_list_file_path)?;
        ensure_exists("zones", &cfg.zones_file_path)?;

        let queue_mode = cfg.queue_mode()?;
        let zones = load_zones(&cfg.zones_file_path, cfg.frame_width, cfg.frame_height)?;
        let classes = ClassList::load(&cfg.class_list_file_path)?;
        print_startup_info(cfg, &zones);

        let detector = YoloDetector::new(&cfg.weight_file_path, cfg.input_size, cfg.nms_threshold)?;
        let camera = CameraStream::open(&cfg.camera_source, cfg.frame_width, cfg.frame_height)?;
        let processor = FrameProcessor::new(zones, classes, cfg.vehicle_classes(), cfg.interval(), queue_mode);
        let actuator = open_actuator(cfg)?;
        let settings = MonitorSettings::from_config(cfg);

        let summary = if cfg.display_enabled() {
            let sink = OpenCvSink::new(&cfg.frame_name, cfg.wait_key, cfg.quit_key());
            Monitor::new(camera, detector, sink, actuator, processor, settings).run().await?
        } else {
            Monitor::new(camera, detector, HeadlessSink, actuator, processor, settings).run().await?
        };
        print_summary(&summary);
        Ok(())
    }

    pub fn write_points(cfg: &AppConfig) -> Result<()> {
        let writer = ZoneFileWriter::new(&cfg.zones_file_path, cfg.max_zones, cfg.frame_width, cfg.frame_height);
        let session = AuthoringSession::new(writer, cfg.quit_key());
        let mut camera = CameraStream::open(&cfg.camera_source, cfg.frame_width, cfg.frame_height)?;
        let saved = run_authoring(&mut camera, session)?;
        info!("{} zone(s) written to {}", saved, cfg.zones_file_path);
        Ok(())
    }

    #[cfg(feature = "raspberry-pi")]
    fn open_actuator(cfg: &AppConfig) -> Result<Box<dyn ActuationChannel + Send>> {
        Ok(Box::new(stls::relay::GpioRelayBoard::open(cfg.relay_pins())?))
    }

    #[cfg(not(feature = "raspberry-pi"))]
    fn open_actuator(_cfg: &AppConfig) -> Result<Box<dyn ActuationChannel + Send>> {
        info!("Built without raspberry-pi support, relay changes are only logged");
        Ok(Box::new(stls::relay::LoggingActuator::new()))
    }

    fn print_startup_info(cfg: &AppConfig, zones: &ZoneSet) {
        let relays = if cfg!(feature = "raspberry-pi") {
            let pins = cfg.relay_pins();
            format!("GPIO car={} motorbike={} default={}", pins.car, pins.motorbike, pins.default)
        } else {
            "logging only".to_string()
        };

        println!("╔══════════════════════════════════════════════════════════╗");
        println!("║            STLS TRAFFIC ZONE MONITOR                     ║");
        println!("╠══════════════════════════════════════════════════════════╣");
        println!("  Camera:    {} @ {}x{}", cfg.camera_source, cfg.frame_width, cfg.frame_height);
        println!("  Model:     {} (conf {:.2})", cfg.weight_file_path, cfg.detect_sensitivity);
        println!("  Zones:     {} from {}", zones.len(), cfg.zones_file_path);
        println!("  Vehicles:  {}", cfg.vehicle_classes);
        println!("  Queue:     {} every {:.1}s", cfg.queue_mode, cfg.time_interval);
        println!("  Relays:    {}", relays);
        println!("  Display:   {}", if cfg.display_enabled() { cfg.frame_name.as_str() } else { "off" });
        println!("╚══════════════════════════════════════════════════════════╝");
    }

    fn print_summary(s: &RunSummary) {
        println!("┌─────────────────────────────────────────────");
        println!(
            "│ {} → {} │ stopped: {:?}",
            s.started_at.format("%H:%M:%S"),
            s.finished_at.format("%H:%M:%S"),
            s.stop_reason
        );
        println!("├─────────────────────────────────────────────");
        println!(
            "│ captured={} forwarded={} dropped={} processed={} actuations={}",
            s.frames_captured, s.frames_forwarded, s.frames_dropped, s.frames_processed, s.actuations
        );
        println!("└─────────────────────────────────────────────");
    }
}

#[cfg(not(feature = "vision"))]
mod vision {
    use anyhow::{bail, Result};

    use stls::config::AppConfig;

    pub async fn run_monitor(_cfg: &AppConfig) -> Result<()> {
        bail!("stls was built without camera support; rebuild with `--features vision` to run the monitor")
    }

    pub fn write_points(_cfg: &AppConfig) -> Result<()> {
        bail!("stls was built without camera support; rebuild with `--features vision` to write zone points")
    }
}
