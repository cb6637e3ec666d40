//! VoxPrep command line
//!
//! Usage:
//!   voxprep convert -i take.m4a -r speaker.wav -o out.wav
//!   voxprep batch -r speaker.wav a.wav b.mp3 c.flac
//!   voxprep prepare -i take.m4a -o take.wav [--reference]
//!   voxprep analyze take.m4a
//!   voxprep estimate -i take.m4a -r speaker.wav
//!   voxprep probe

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::json;

use vp_audio::{AudioDecoder, AudioRole, LoudnessMeter, WavEncoder};
use vp_convert::{BatchController, BatchRequest, ConversionConfig, ConversionOrchestrator, Device};

#[derive(Parser)]
#[command(name = "voxprep", version, about = "Voice audio preparation and conversion")]
struct Cli {
    /// JSON configuration file (absent keys keep defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Processing device override (cpu, cuda)
    #[arg(short, long, global = true)]
    device: Option<Device>,

    /// Log more (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one file to the reference speaker's voice
    Convert {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        reference: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Convert many files against one reference
    Batch {
        #[arg(short, long)]
        reference: PathBuf,
        /// Output directory (default from config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Jobs in flight at once
        #[arg(short = 'j', long)]
        max_concurrent: Option<usize>,
        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Run the preparation pipeline only and write the result
    Prepare {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Prepare as reference audio (applies the voiced-content floor)
        #[arg(long)]
        reference: bool,
    },
    /// Print duration, loudness and voice activity of a file
    Analyze { file: PathBuf },
    /// Estimate processing time for a conversion
    Estimate {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        reference: PathBuf,
    },
    /// Check whether the conversion engine can run
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => ConversionConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ConversionConfig::default(),
    };
    if let Some(device) = cli.device {
        config = config.with_device(device);
    }

    match cli.command {
        Commands::Convert { input, reference, output } => convert(config, &input, &reference, &output).await,
        Commands::Batch {
            reference,
            output_dir,
            max_concurrent,
            inputs,
        } => batch(config, inputs, reference, output_dir, max_concurrent).await,
        Commands::Prepare { input, output, reference } => prepare(config, &input, &output, reference),
        Commands::Analyze { file } => analyze(config, &file),
        Commands::Estimate { input, reference } => estimate(config, &input, &reference),
        Commands::Probe => probe(config),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

async fn convert(config: ConversionConfig, input: &Path, reference: &Path, output: &Path) -> Result<()> {
    let orchestrator = ConversionOrchestrator::with_command_engine(config)?;
    let outcome = orchestrator.convert(input, reference, output).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn batch(
    config: ConversionConfig,
    inputs: Vec<PathBuf>,
    reference: PathBuf,
    output_dir: Option<PathBuf>,
    max_concurrent: Option<usize>,
) -> Result<()> {
    let orchestrator = Arc::new(ConversionOrchestrator::with_command_engine(config)?);
    let controller = BatchController::new(orchestrator);

    let mut request = BatchRequest::new(inputs, reference);
    if let Some(dir) = output_dir {
        request = request.with_output_dir(dir);
    }
    if let Some(max) = max_concurrent {
        request = request.with_max_concurrent(max);
    }

    let report = controller.run_batch(request).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.completed == 0 {
        bail!("All {} conversions failed", report.total);
    }
    Ok(())
}

fn prepare(config: ConversionConfig, input: &Path, output: &Path, reference: bool) -> Result<()> {
    let pipeline = vp_audio::OptimizationPipeline::new(config.pipeline)?;
    let role = if reference {
        AudioRole::Reference
    } else {
        AudioRole::Input
    };

    let prepared = pipeline
        .prepare_file(input, role)
        .with_context(|| format!("Failed to prepare {}", input.display()))?;
    WavEncoder::write_file(&prepared.buffer, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!("Prepared {} -> {}", input.display(), output.display());
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "output": output,
            "total_duration": prepared.total_duration,
            "voice_duration": prepared.voice_duration,
            "voice_ratio": prepared.voice_ratio,
            "report": prepared.report,
        }))?
    );
    Ok(())
}

fn analyze(config: ConversionConfig, file: &Path) -> Result<()> {
    let buffer = AudioDecoder::decode_file(file).with_context(|| format!("Failed to decode {}", file.display()))?;
    let pipeline = vp_audio::OptimizationPipeline::new(config.pipeline)?;
    let voice = pipeline.analyze(&buffer);

    let loudness = match LoudnessMeter::integrated(&buffer) {
        Ok(lufs) => json!({ "integrated_lufs": lufs }),
        Err(reason) => json!({ "unavailable": reason.to_string() }),
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "file": file,
            "info": buffer.info(),
            "peak_db": buffer.peak_db(),
            "loudness": loudness,
            "voice": voice,
            "voice_ratio": voice.voice_ratio(),
        }))?
    );
    Ok(())
}

fn estimate(config: ConversionConfig, input: &Path, reference: &Path) -> Result<()> {
    let orchestrator = ConversionOrchestrator::with_command_engine(config)?;
    let estimate = orchestrator.estimate(input, reference)?;
    println!("{}", serde_json::to_string_pretty(&estimate)?);
    Ok(())
}

fn probe(config: ConversionConfig) -> Result<()> {
    let orchestrator = ConversionOrchestrator::with_command_engine(config)?;
    let available = orchestrator.is_engine_available();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "engine": orchestrator.config().engine.program,
            "available": available,
            "device": orchestrator.config().device,
            "version": vp_convert::VERSION,
        }))?
    );
    if !available {
        bail!("Conversion engine is not available");
    }
    Ok(())
}
