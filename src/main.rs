use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use arm_recorder::config::RecorderConfig;
use arm_recorder::control::{AngleUnit, ArmController, DEFAULT_MOVE_SPEED};
use arm_recorder::core::ArmSide;
use arm_recorder::hal::mock::{SimulatedArmConnector, SimulatedCameraConnector};
use arm_recorder::hal::{ArmAddress, ArmConfig, CameraSource, DEFAULT_ARM_PORT};
use arm_recorder::{logging, DatasetRecorder, FlatRecorder, RecorderError};

#[derive(Parser, Debug)]
#[command(name = "arm-recorder", version, about = "Record dual-arm sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record episodes into a LeRobot-style dataset
    Record(RecordArgs),
    /// Record one session into a single JSON file
    RecordFlat(RecordFlatArgs),
    /// Read or command an arm directly
    Arm(ArmArgs),
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// JSON configuration file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    dataset_name: Option<String>,
    #[arg(long)]
    dataset_path: Option<PathBuf>,
    /// Description of the task being performed
    #[arg(long)]
    task: String,
    #[arg(long, default_value_t = 1)]
    num_episodes: usize,
    #[arg(long)]
    robot_type: Option<String>,
    #[arg(long)]
    fps: Option<u32>,
    /// Left arm address [default: 169.254.128.18]
    #[arg(long)]
    arm1_ip: Option<String>,
    #[arg(long, default_value_t = DEFAULT_ARM_PORT)]
    arm1_port: u16,
    /// Right arm address [default: 169.254.128.19]
    #[arg(long)]
    arm2_ip: Option<String>,
    #[arg(long, default_value_t = DEFAULT_ARM_PORT)]
    arm2_port: u16,
    /// Camera index or device path, repeatable
    #[arg(long = "camera")]
    cameras: Vec<String>,
}

#[derive(Args, Debug)]
struct RecordFlatArgs {
    #[arg(long)]
    arm1_ip: Option<String>,
    #[arg(long, default_value_t = DEFAULT_ARM_PORT)]
    arm1_port: u16,
    #[arg(long)]
    arm2_ip: Option<String>,
    #[arg(long, default_value_t = DEFAULT_ARM_PORT)]
    arm2_port: u16,
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Output file, defaults to arm_recording_<timestamp>.json
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ArmArgs {
    #[arg(long, default_value = "192.168.1.18")]
    arm1_ip: String,
    #[arg(long, default_value_t = DEFAULT_ARM_PORT)]
    arm1_port: u16,
    #[arg(long, default_value = "192.168.1.19")]
    arm2_ip: String,
    #[arg(long, default_value_t = DEFAULT_ARM_PORT)]
    arm2_port: u16,
    /// Print joint states
    #[arg(long)]
    read: bool,
    /// Print controller model and software versions
    #[arg(long)]
    info: bool,
    /// Move to seven joint angles
    #[arg(long, num_args = 7, value_names = ["J1", "J2", "J3", "J4", "J5", "J6", "J7"], allow_negative_numbers = true)]
    set: Option<Vec<f64>>,
    /// Arm to address (1 or 2); both when omitted
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    arm: Option<u8>,
    /// Angles given to --set are in degrees
    #[arg(long)]
    degrees: bool,
    #[arg(long, default_value_t = DEFAULT_MOVE_SPEED)]
    speed: u32,
    /// Return before the move completes
    #[arg(long)]
    no_block: bool,
}

enum StopSignal {
    Enter,
    Interrupt,
}

/// Wait for ENTER on stdin or Ctrl-C
async fn wait_for_stop() -> StopSignal {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tokio::select! {
        _ = lines.next_line() => StopSignal::Enter,
        _ = tokio::signal::ctrl_c() => StopSignal::Interrupt,
    }
}

fn side_of(arm: u8) -> ArmSide {
    if arm == 2 {
        ArmSide::Right
    } else {
        ArmSide::Left
    }
}

fn record_config(args: &RecordArgs) -> Result<RecorderConfig> {
    let mut config = match &args.config {
        Some(path) => RecorderConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RecorderConfig::default(),
    };

    match (&args.dataset_name, &args.config) {
        (Some(name), _) => config.dataset_name = name.clone(),
        (None, None) => bail!("--dataset-name is required without --config"),
        (None, Some(_)) => {}
    }
    if let Some(path) = &args.dataset_path {
        config.dataset_path = path.clone();
    }
    if let Some(robot_type) = &args.robot_type {
        config.robot_type = robot_type.clone();
    }
    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    if let Some(ip) = &args.arm1_ip {
        config.set_arm(ArmSide::Left, ArmAddress::new(ip.as_str(), args.arm1_port));
    }
    if let Some(ip) = &args.arm2_ip {
        config.set_arm(ArmSide::Right, ArmAddress::new(ip.as_str(), args.arm2_port));
    }
    if !args.cameras.is_empty() {
        config.cameras = args
            .cameras
            .iter()
            .map(|s| s.parse::<CameraSource>())
            .collect::<Result<_, _>>()?;
    }

    config.validate()?;
    Ok(config)
}

async fn record(args: RecordArgs) -> Result<()> {
    let config = record_config(&args)?;
    println!("Dataset: {}", config.dataset_name);
    println!("Task: {}", args.task);
    println!("Episodes: {}", args.num_episodes);
    println!("FPS: {}", config.fps);

    tracing::info!("Using simulated arm and camera drivers");
    let arms = SimulatedArmConnector::new();
    let cameras = SimulatedCameraConnector::new();

    let mut recorder = DatasetRecorder::new(config)?;
    recorder
        .connect(&arms, &cameras)
        .await
        .context("Failed to connect to robotic arms")?;

    let outcome = record_episodes(&mut recorder, &args).await;

    if let Err(e) = recorder.disconnect().await {
        tracing::error!("Disconnect failed: {}", e);
    }
    outcome
}

async fn record_episodes(recorder: &mut DatasetRecorder, args: &RecordArgs) -> Result<()> {
    for n in 0..args.num_episodes {
        println!("\nEpisode {} / {}", n + 1, args.num_episodes);
        recorder.start_episode(args.task.as_str(), 0)?;
        recorder.start_recording()?;

        println!("Perform the task. Press ENTER when done...");
        match wait_for_stop().await {
            StopSignal::Enter => {
                recorder
                    .finish_episode()
                    .await
                    .context("Failed to finish episode")?;
            }
            StopSignal::Interrupt => {
                println!("\nRecording interrupted by user");
                recorder.abort().await?;
                bail!("interrupted");
            }
        }
    }

    recorder.save_dataset_info()?;

    let total_frames: usize = recorder.episodes().iter().map(|e| e.len()).sum();
    println!("\nDataset recording complete");
    println!("Location: {}", recorder.layout().root().display());
    println!("Episodes: {}", recorder.episodes().len());
    println!("Total frames: {}", total_frames);
    Ok(())
}

async fn record_flat(args: RecordFlatArgs) -> Result<()> {
    let mut arms = Vec::new();
    if let Some(ip) = args.arm1_ip {
        arms.push(ArmConfig {
            side: ArmSide::Left,
            address: ArmAddress::new(ip, args.arm1_port),
        });
    }
    if let Some(ip) = args.arm2_ip {
        arms.push(ArmConfig {
            side: ArmSide::Right,
            address: ArmAddress::new(ip, args.arm2_port),
        });
    }
    if arms.is_empty() {
        bail!("at least one of --arm1-ip or --arm2-ip is required");
    }

    let connector = SimulatedArmConnector::new();
    let mut recorder = FlatRecorder::new(args.fps, RecorderConfig::default().stop_timeout());
    recorder
        .connect(&connector, &arms)
        .await
        .context("Failed to connect to robotic arms")?;

    recorder.start_recording()?;
    println!("Press ENTER to stop recording");
    if let StopSignal::Interrupt = wait_for_stop().await {
        println!("\nRecording interrupted by user");
    }
    recorder.stop_recording().await?;

    let path = recorder.save_data(args.output.as_deref())?;
    println!("Data saved to {}", path.display());
    recorder.disconnect().await?;
    Ok(())
}

async fn arm(args: ArmArgs) -> Result<()> {
    let mut configs = Vec::new();
    if args.arm != Some(2) {
        configs.push(ArmConfig {
            side: ArmSide::Left,
            address: ArmAddress::new(args.arm1_ip.as_str(), args.arm1_port),
        });
    }
    if args.arm != Some(1) {
        configs.push(ArmConfig {
            side: ArmSide::Right,
            address: ArmAddress::new(args.arm2_ip.as_str(), args.arm2_port),
        });
    }

    let connector = SimulatedArmConnector::new();
    let mut controller = ArmController::connect(&connector, &configs)
        .await
        .context("Failed to connect to robotic arms")?;

    if let Some(angles) = &args.set {
        let Some(arm) = args.arm else {
            bail!("--set requires --arm");
        };
        let unit = if args.degrees {
            AngleUnit::Degrees
        } else {
            AngleUnit::Radians
        };
        controller
            .set_joint_states(side_of(arm), angles, unit, args.speed, !args.no_block)
            .await?;
        println!("Moved arm {arm}");
    }

    if args.info {
        for side in controller.connected_arms() {
            print_software_info(&mut controller, side).await;
        }
    }

    if args.read || (args.set.is_none() && !args.info) {
        for side in controller.connected_arms() {
            match controller.read_joint_states(side).await {
                Ok(joints) => {
                    println!("\n=== {} Joint States ===", side.legacy_name());
                    for (i, angle) in joints.iter().enumerate() {
                        println!("  Joint {}: {:.4} rad ({:.2} deg)", i + 1, angle, angle.to_degrees());
                    }
                }
                Err(e) => println!("Failed to read {} joint states: {}", side.legacy_name(), e),
            }
        }
    }

    controller.disconnect().await;
    Ok(())
}

async fn print_software_info(controller: &mut ArmController, side: ArmSide) {
    let address = controller
        .address(side)
        .map(|a| a.to_string())
        .unwrap_or_default();
    println!("\n=== {} Software Info ({}) ===", side.legacy_name(), address);

    match controller.software_info(side).await {
        Ok(info) => {
            println!("  Model: {}", info.product_version);
            println!("  Algorithm Version: {}", info.algorithm_version);
            println!("  Control Version: {}", info.control_version);
            println!("  Dynamics Version: {}", info.dynamics_version);
            println!("  Planning Version: {}", info.planning_version);
        }
        Err(RecorderError::Device(e)) => match e.code() {
            Some(code) => println!("  Failed to get arm information, Error code: {}", code),
            None => println!("  Failed to get arm information: {}", e),
        },
        Err(e) => println!("  Failed to get arm information: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Record(args) => record(args).await,
        Command::RecordFlat(args) => record_flat(args).await,
        Command::Arm(args) => arm(args).await,
    }
}
