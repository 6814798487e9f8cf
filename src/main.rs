//! ebdcap - dump the embedded binary descriptor of raw sensor frames

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use tracing::{info, warn};

use ebdcap::capture::{CaptureDevice, SyntheticCapture, V4l2Capture};
use ebdcap::{report, utils, Config, Pipeline};

#[derive(Parser)]
#[command(name = "ebdcap", version, about)]
struct Cli {
    /// Optional TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `ebdcap=debug`
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DeviceArgs {
    /// Device node, e.g. /dev/video0 (auto-detected when unset)
    #[arg(short, long)]
    device: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Use the built-in frame generator instead of a device
    #[arg(long)]
    synthetic: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Capture frames and print a decoded EBD report for each
    Capture {
        #[command(flatten)]
        dev: DeviceArgs,

        /// Number of frames to capture
        #[arg(short = 'n', long)]
        frames: Option<u64>,
    },
    /// Capture one frame and hex-dump a range of its rows
    Rows {
        #[command(flatten)]
        dev: DeviceArgs,

        start_row: u32,

        end_row: u32,
    },
    /// List capture devices
    List,
}

impl DeviceArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.capture.device = device.clone();
        }
        if let Some(width) = self.width {
            config.capture.width = width;
        }
        if let Some(height) = self.height {
            config.capture.height = height;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).wrap_err("failed to load configuration")?;
    if let Some(filter) = &cli.log {
        config.log.filter = filter.clone();
    }

    // Reports go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(config.log.filter.as_str())
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Capture { dev, frames } => {
            dev.apply(&mut config);
            if let Some(frames) = frames {
                config.pipeline.frame_count = frames;
            }
            if dev.synthetic {
                let device = SyntheticCapture::new(config.capture.width, config.capture.height)
                    .with_interval(Duration::from_millis(33));
                capture(device, config).await
            } else {
                resolve_device(&mut config)?;
                let device =
                    V4l2Capture::open(&config.capture.device, config.capture.buffer_count)?;
                capture(device, config).await
            }
        }
        Command::Rows {
            dev,
            start_row,
            end_row,
        } => {
            if start_row > end_row {
                return Err(eyre!("start row {} is after end row {}", start_row, end_row));
            }
            dev.apply(&mut config);
            if dev.synthetic {
                let device = SyntheticCapture::new(config.capture.width, config.capture.height);
                dump_rows(device, &config, start_row, end_row)
            } else {
                resolve_device(&mut config)?;
                let device =
                    V4l2Capture::open(&config.capture.device, config.capture.buffer_count)?;
                dump_rows(device, &config, start_row, end_row)
            }
        }
        Command::List => {
            let mut out = io::stdout().lock();
            for found in utils::list_devices() {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{:?}",
                    found.path, found.card, found.driver, found.formats
                )?;
            }
            Ok(())
        }
    }
}

/// Fill in an unset device node from the first usable capture node
fn resolve_device(config: &mut Config) -> Result<()> {
    if !config.capture.device.is_empty() {
        return Ok(());
    }
    let found = utils::auto_detect_device()
        .ok_or_else(|| eyre!("no capture device offering UYVY, YUYV or GREY found"))?;
    if let Some(format) = found.preferred_format() {
        config.capture.format = format;
    }
    info!(
        "Using capture device {} ({}, {})",
        found.path, found.card, config.capture.format
    );
    config.capture.device = found.path;
    Ok(())
}

async fn capture<D>(mut device: D, config: Config) -> Result<()>
where
    D: CaptureDevice + Send + 'static,
{
    let cap = &config.capture;
    device.configure(cap.width, cap.height, cap.format)?;

    let mut pipeline = Pipeline::new(device, &config.pipeline);
    let cancel = pipeline.cancel_token();
    let frames = config.pipeline.frame_count;

    info!("Capturing {} frames from {}", frames, cap.device);
    let mut run =
        tokio::task::spawn_blocking(move || pipeline.run(frames, BufWriter::new(io::stdout())));

    let summary = tokio::select! {
        res = &mut run => res??,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping after the current frame");
            cancel.cancel();
            run.await??
        }
    };

    info!(
        "Captured {}/{} frames, {} decoded, {} failed, {:.1} fps",
        summary.captured,
        summary.requested,
        summary.consumer.decoded,
        summary.consumer.decode_failures,
        summary.capture_fps()
    );

    match summary.device_error {
        Some(e) => Err(e).wrap_err(format!(
            "capture aborted after {} of {} frames",
            summary.captured, summary.requested
        )),
        None => Ok(()),
    }
}

fn dump_rows<D: CaptureDevice>(
    mut device: D,
    config: &Config,
    start_row: u32,
    end_row: u32,
) -> Result<()> {
    let cap = &config.capture;
    device.configure(cap.width, cap.height, cap.format)?;
    device.start()?;

    let bytes_per_row = cap
        .format
        .row_bytes(cap.width)
        .ok_or_else(|| eyre!("row of {} pixels does not fit in memory", cap.width))?;
    let dumped: Result<report::RowDump> = match device.acquire_frame() {
        Ok(frame) => {
            let mut out = io::stdout().lock();
            report::dump_rows(&mut out, frame, bytes_per_row, start_row, end_row)
                .map_err(Into::into)
        }
        Err(e) => Err(e.into()),
    };

    let stopped = device.stop();
    device.release();

    let dump = dumped?;
    stopped?;
    if dump.rows_clipped > 0 {
        warn!(
            "{} requested rows lie past the end of the frame",
            dump.rows_clipped
        );
    }
    info!("Dumped {} rows ({} bytes)", dump.rows_printed, dump.bytes_printed);
    Ok(())
}
