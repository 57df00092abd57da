//! Transcode CLI - Command-line interface for the staged media pipeline.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use transcode::{
    AudioConfig, CodecId, InputConfig, Logger, OutputConfig, PixelFormat, Rational, SampleFormat,
    TranscodeOptions, TranscodeStats, Transcoder, VideoConfig,
};

/// Output mode for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    /// Normal output with progress bar.
    Normal,
    /// JSON output for programmatic parsing.
    Json,
    /// Quiet mode with minimal output.
    Quiet,
    /// Verbose mode with detailed stats.
    Verbose,
}

/// What `--list` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Listing {
    Codecs,
    Filters,
    Bsfs,
}

/// JSON completion output structure.
#[derive(Debug, Clone, Serialize)]
struct JsonCompleteOutput {
    #[serde(rename = "type")]
    msg_type: &'static str,
    success: bool,
    stats: FinalStats,
}

/// Final transcoding statistics.
#[derive(Debug, Clone, Serialize)]
struct FinalStats {
    units_read: u64,
    units_written: u64,
    units_skipped: u64,
    busy_retries: u64,
    input_size_bytes: u64,
    output_size_bytes: u64,
    compression_ratio: f64,
    elapsed_seconds: f64,
    units_per_second: f64,
}

impl From<&TranscodeStats> for FinalStats {
    fn from(stats: &TranscodeStats) -> Self {
        let units_per_second = if stats.elapsed_secs > 0.0 {
            stats.units_written as f64 / stats.elapsed_secs
        } else {
            0.0
        };
        Self {
            units_read: stats.units_read,
            units_written: stats.units_written,
            units_skipped: stats.units_skipped,
            busy_retries: stats.busy_retries,
            input_size_bytes: stats.input_bytes,
            output_size_bytes: stats.output_bytes,
            compression_ratio: stats.compression_ratio(),
            elapsed_seconds: stats.elapsed_secs,
            units_per_second,
        }
    }
}

/// Command-line arguments for the transcode tool.
#[derive(Parser, Debug)]
#[command(name = "transcode")]
#[command(version)]
#[command(about = "Decode, filter, convert and re-encode raw media streams")]
#[command(long_about = "Transcode runs raw video and PCM audio through a staged pipeline:\n\
    decoder, optional filter graph, optional format conversion, encoder and\n\
    optional stream filters.\n\n\
    EXAMPLES:\n    \
    transcode -i in.yuv -o out.rgb --size 640x480 --pix-fmt yuv420p --out-pix-fmt rgb24\n    \
    transcode -i in.yuv -o out.yuv --size 640x480 --pix-fmt yuv420p --vf 'scale=w=320:h=-1'\n    \
    transcode -i in.pcm -o out.pcm --codec pcm_s16le --sample-rate 48000 --channels 2 --out-sample-rate 44100\n    \
    transcode --job job.json --json\n    \
    transcode --list filters")]
struct Args {
    /// Input file path
    #[arg(short, long, required_unless_present_any = ["job", "list"])]
    input: Option<PathBuf>,

    /// Output file path
    #[arg(short, long, required_unless_present_any = ["job", "list"])]
    output: Option<PathBuf>,

    /// Read the whole job from a JSON file instead of flags
    #[arg(long, conflicts_with_all = ["input", "output"])]
    job: Option<PathBuf>,

    /// Print the available codecs, filters or stream filters and exit
    #[arg(long, value_enum)]
    list: Option<Listing>,

    /// Codec of the input units (rawvideo, pcm_s16le, ...)
    #[arg(long, default_value = "rawvideo")]
    codec: CodecId,

    /// Input picture size, WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Input pixel format
    #[arg(long)]
    pix_fmt: Option<PixelFormat>,

    /// Input frame rate, e.g. 30000/1001
    #[arg(long)]
    rate: Option<Rational>,

    /// Input sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Input channel count
    #[arg(long)]
    channels: Option<u32>,

    /// Samples per input unit
    #[arg(long)]
    frame_samples: Option<usize>,

    /// Output codec (defaults to the input codec)
    #[arg(short = 'c', long)]
    output_codec: Option<CodecId>,

    /// Filter graph run on decoded units (e.g., "scale=w=320:h=-1,format=pix_fmts=rgb24")
    #[arg(short = 'F', long = "vf", visible_alias = "af")]
    filters: Option<String>,

    /// Comma-separated stream filters run on encoded units (e.g., "setts=offset=10")
    #[arg(long)]
    bsf: Option<String>,

    /// Output picture size, WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    scale: Option<(u32, u32)>,

    /// Output pixel format
    #[arg(long)]
    out_pix_fmt: Option<PixelFormat>,

    /// Picture scaling filter (bilinear, neighbor)
    #[arg(long)]
    scale_filter: Option<String>,

    /// Output sample rate in Hz
    #[arg(long)]
    out_sample_rate: Option<u32>,

    /// Output channel count
    #[arg(long)]
    out_channels: Option<u32>,

    /// Output sample format
    #[arg(long)]
    out_sample_fmt: Option<SampleFormat>,

    /// Resampler (sinc, linear)
    #[arg(long)]
    resampler: Option<String>,

    /// Samples per encoded audio unit (0 keeps the decoded sizes)
    #[arg(long)]
    frame_size: Option<usize>,

    /// Decode into surfaces of the emulated accelerator
    #[arg(long)]
    hwaccel: bool,

    /// Number of threads to use (default: auto-detect)
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Overwrite output file if it exists
    #[arg(short = 'y', long)]
    overwrite: bool,

    /// Disable progress bar
    #[arg(long)]
    no_progress: bool,

    /// Verbose output (debug logging and detailed stats)
    #[arg(short, long, conflicts_with = "quiet", conflicts_with = "json")]
    verbose: bool,

    /// Quiet mode (minimal output, only print output path on success)
    #[arg(short, long, conflicts_with = "verbose", conflicts_with = "json")]
    quiet: bool,

    /// JSON output mode for programmatic parsing
    #[arg(long, conflicts_with = "verbose", conflicts_with = "quiet")]
    json: bool,

    /// Progress update interval in milliseconds (for JSON mode)
    #[arg(long, default_value = "500")]
    progress_interval: u64,
}

impl Args {
    /// Determine the output mode based on flags.
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else if self.verbose {
            OutputMode::Verbose
        } else {
            OutputMode::Normal
        }
    }

    /// Build the job, from `--job` or from the individual flags.
    fn options(&self) -> anyhow::Result<TranscodeOptions> {
        let mut options = match &self.job {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading job file {}", path.display()))?;
                serde_json::from_str::<TranscodeOptions>(&text)
                    .with_context(|| format!("parsing job file {}", path.display()))?
            }
            None => self.options_from_flags()?,
        };
        if self.overwrite {
            options = options.overwrite(true);
        }
        if self.hwaccel {
            options = options.hardware_acceleration(true);
        }
        if let Some(threads) = self.threads {
            options = options.threads(threads);
        }
        Ok(options)
    }

    fn options_from_flags(&self) -> anyhow::Result<TranscodeOptions> {
        let (Some(input), Some(output)) = (&self.input, &self.output) else {
            bail!("both --input and --output are required");
        };

        let mut input = InputConfig::new(input, self.codec);
        if let (Some((width, height)), Some(format)) = (self.size, self.pix_fmt) {
            input = input.video(width, height, format);
        }
        if let Some(rate) = self.rate {
            input = input.frame_rate(rate);
        }
        if let (Some(rate), Some(channels)) = (self.sample_rate, self.channels) {
            input = input.audio(rate, channels);
        }
        if let Some(samples) = self.frame_samples {
            input = input.frame_samples(samples);
        }

        let mut output = OutputConfig::new(output);
        if let Some(codec) = self.output_codec {
            output = output.codec(codec);
        }
        if let Some(samples) = self.frame_size {
            output = output.frame_size(samples);
        }

        let mut options = TranscodeOptions::new().input_config(input).output_config(output);
        if let Some(filters) = &self.filters {
            options = options.filters(filters.as_str());
        }
        if let Some(list) = &self.bsf {
            options = options.bitstream_filters(list.as_str());
        }

        if self.scale.is_some() || self.out_pix_fmt.is_some() || self.scale_filter.is_some() {
            let mut video = VideoConfig::new();
            if let Some((width, height)) = self.scale {
                video = video.resolution(width, height);
            }
            if let Some(format) = self.out_pix_fmt {
                video = video.pixel_format(format);
            }
            video.scale_filter = self.scale_filter.clone();
            options = options.video_config(video);
        }

        if self.out_sample_rate.is_some()
            || self.out_channels.is_some()
            || self.out_sample_fmt.is_some()
            || self.resampler.is_some()
        {
            let mut audio = AudioConfig::new();
            if let Some(rate) = self.out_sample_rate {
                audio = audio.sample_rate(rate);
            }
            if let Some(channels) = self.out_channels {
                audio = audio.channels(channels);
            }
            if let Some(format) = self.out_sample_fmt {
                audio = audio.sample_format(format);
            }
            audio.resampler = self.resampler.clone();
            options = options.audio_config(audio);
        }
        Ok(options)
    }
}

/// Parse `WIDTHxHEIGHT`.
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("'{s}' is not WIDTHxHEIGHT"))?;
    let width = w.trim().parse().map_err(|_| format!("bad width in '{s}'"))?;
    let height = h.trim().parse().map_err(|_| format!("bad height in '{s}'"))?;
    if width == 0 || height == 0 {
        return Err(format!("'{s}' has a zero dimension"));
    }
    Ok((width, height))
}

fn create_progress_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}% | {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-")
}

/// Format bytes as human-readable size.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn print_listing(listing: Listing, mode: OutputMode) -> anyhow::Result<()> {
    match listing {
        Listing::Codecs => {
            let codecs: Vec<_> = transcode::codecs().collect();
            if mode == OutputMode::Json {
                let entries: Vec<_> = codecs
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "name": c.name(),
                            "description": c.long_name,
                            "type": c.id.media_type().to_string(),
                            "decode": c.can_decode,
                            "encode": c.can_encode,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "codecs": entries }))?);
            } else {
                println!("{}", style("Codecs:").cyan().bold());
                for codec in codecs {
                    let flags = format!(
                        "{}{}",
                        if codec.can_decode { 'D' } else { '.' },
                        if codec.can_encode { 'E' } else { '.' }
                    );
                    println!("  {} {:12} {}", style(flags).yellow(), codec.name(), codec.long_name);
                }
            }
        }
        Listing::Filters => print_names("Filters", "filters", transcode::FILTER_KINDS, mode)?,
        Listing::Bsfs => print_names("Stream filters", "bsfs", transcode_codecs::bsf::BSF_NAMES, mode)?,
    }
    Ok(())
}

fn print_names(title: &str, key: &str, names: &[&str], mode: OutputMode) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        let mut listing = serde_json::Map::new();
        listing.insert(key.to_string(), serde_json::json!(names));
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        println!("{}", style(format!("{title}:")).cyan().bold());
        for name in names {
            println!("  {name}");
        }
    }
    Ok(())
}

fn print_configuration(options: &TranscodeOptions) {
    println!("{}", style("Configuration:").cyan().bold());
    if let Some(input) = &options.input {
        println!("  Input:        {} ({})", style(input.path.display()).white(), input.codec);
    }
    if let Some(output) = &options.output {
        println!("  Output:       {}", style(output.path.display()).white());
    }
    if let Ok(codec) = options.output_codec() {
        println!("  Codec:        {}", style(codec).white());
    }
    if let Some(filters) = &options.filters {
        println!("  Filters:      {}", style(filters).white());
    }
    if let Some(list) = &options.bitstream_filters {
        println!("  Stream filt.: {}", style(list).white());
    }
    if options.hardware_accel {
        println!("  Hardware:     {}", style("emulated device").green());
    }
    println!();
}

fn print_stats(stats: &TranscodeStats, output: &str, verbose: bool) {
    println!("{}", style("Transcoding complete!").green().bold());
    println!();
    println!("{}", style("Statistics:").cyan().bold());
    println!("  {:20} {:.2}s", "Time elapsed:", stats.elapsed_secs);
    println!("  {:20} {}", "Units written:", stats.units_written);
    if verbose {
        println!("  {:20} {}", "Units read:", stats.units_read);
        println!("  {:20} {}", "Units skipped:", stats.units_skipped);
        println!("  {:20} {}", "Busy retries:", stats.busy_retries);
    }
    println!("  {:20} {}", "Input size:", format_size(stats.input_bytes));
    println!("  {:20} {}", "Output size:", format_size(stats.output_bytes));
    println!(
        "  {:20} {}",
        "Compression ratio:",
        style(format!("{:.2}x", stats.compression_ratio())).yellow()
    );
    println!();
    println!("{} {}", style("Output saved to:").white(), style(output).green().bold());
}

fn init_logging(mode: OutputMode) {
    if mode == OutputMode::Json || mode == OutputMode::Quiet {
        return;
    }
    let default = if mode == OutputMode::Verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let output_mode = args.output_mode();
    init_logging(output_mode);

    if let Some(listing) = args.list {
        return print_listing(listing, output_mode);
    }

    let options = args.options()?;
    let output_path = options
        .output
        .as_ref()
        .map(|o| o.path.display().to_string())
        .unwrap_or_default();

    match output_mode {
        OutputMode::Normal | OutputMode::Verbose => print_configuration(&options),
        OutputMode::Json => {
            let start = serde_json::json!({ "type": "start", "job": &options });
            println!("{}", start);
        }
        OutputMode::Quiet => {}
    }

    let logger = if matches!(output_mode, OutputMode::Normal | OutputMode::Verbose) {
        Logger::new("transcoder", "cli")
    } else {
        Logger::disabled()
    };
    let mut transcoder = Transcoder::new(options)?.with_logger(logger);

    let progress_bar = match output_mode {
        OutputMode::Normal | OutputMode::Verbose if !args.no_progress => {
            let pb = ProgressBar::new(100);
            pb.set_style(create_progress_style());
            pb.enable_steady_tick(Duration::from_millis(100));
            Some(pb)
        }
        _ => None,
    };
    if let Some(pb) = progress_bar.clone() {
        transcoder = transcoder.on_progress(move |percent, written| {
            pb.set_position(percent as u64);
            pb.set_message(format!("{written} units"));
        });
    } else if output_mode == OutputMode::Json && !args.no_progress {
        let interval = Duration::from_millis(args.progress_interval);
        let last = Arc::new(Mutex::new(Instant::now()));
        transcoder = transcoder.on_progress(move |percent, written| {
            let Ok(mut last) = last.lock() else {
                return;
            };
            if last.elapsed() >= interval {
                *last = Instant::now();
                println!(
                    "{}",
                    serde_json::json!({ "type": "progress", "percentage": percent, "units_written": written })
                );
            }
        });
    }

    let result = transcoder.run();
    if let Some(pb) = &progress_bar {
        pb.finish_and_clear();
    }
    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            if output_mode == OutputMode::Json {
                let error = serde_json::json!({
                    "type": "error",
                    "recoverable": e.is_recoverable(),
                    "message": e.to_string()
                });
                println!("{}", error);
                std::process::exit(1);
            }
            return Err(e).context("transcoding failed");
        }
    };

    match output_mode {
        OutputMode::Json => {
            let output = JsonCompleteOutput {
                msg_type: "complete",
                success: true,
                stats: FinalStats::from(&stats),
            };
            println!("{}", serde_json::to_string(&output)?);
        }
        OutputMode::Quiet => println!("{output_path}"),
        OutputMode::Normal => print_stats(&stats, &output_path, false),
        OutputMode::Verbose => print_stats(&stats, &output_path, true),
    }

    info!(units = stats.units_written, "transcoding completed");
    debug!(?stats, "final stats");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("transcode").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("640x480"), Ok((640, 480)));
        assert_eq!(parse_size("16X9"), Ok((16, 9)));
        assert!(parse_size("640").is_err());
        assert!(parse_size("0x480").is_err());
        assert!(parse_size("ax480").is_err());
    }

    #[test]
    fn test_output_mode() {
        assert_eq!(parse(&["--list", "codecs"]).output_mode(), OutputMode::Normal);
        assert_eq!(parse(&["--list", "codecs", "--json"]).output_mode(), OutputMode::Json);
        assert_eq!(parse(&["--list", "codecs", "-q"]).output_mode(), OutputMode::Quiet);
        assert!(Args::try_parse_from(["transcode", "--list", "codecs", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_input_and_output_required() {
        assert!(Args::try_parse_from(["transcode", "-i", "in.yuv"]).is_err());
        assert!(Args::try_parse_from(["transcode", "--job", "job.json", "-i", "in.yuv"]).is_err());
    }

    #[test]
    fn test_video_flags_build_options() {
        let args = parse(&[
            "-i", "in.yuv", "-o", "out.rgb", "--size", "64x48", "--pix-fmt", "yuv420p",
            "--rate", "30", "--out-pix-fmt", "rgb24", "--vf", "scale=w=32:h=-1", "--bsf", "null",
        ]);
        let options = args.options().unwrap();
        let input = options.input.as_ref().unwrap();
        assert_eq!((input.width, input.height), (Some(64), Some(48)));
        assert_eq!(input.frame_rate, Some(Rational::new(30, 1)));
        assert_eq!(options.video.as_ref().unwrap().pixel_format, Some(PixelFormat::Rgb24));
        assert_eq!(options.filters.as_deref(), Some("scale=w=32:h=-1"));
        assert_eq!(options.bitstream_filters.as_deref(), Some("null"));
        assert!(options.audio.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_audio_flags_build_options() {
        let args = parse(&[
            "-i", "in.pcm", "-o", "out.pcm", "--codec", "pcm_s16le", "--sample-rate", "48000",
            "--channels", "2", "-c", "pcm_f32le", "--out-sample-rate", "44100",
            "--resampler", "linear", "--frame-size", "1024", "-y",
        ]);
        let options = args.options().unwrap();
        assert_eq!(options.output_codec().unwrap(), CodecId::PcmF32Le);
        let audio = options.audio.as_ref().unwrap();
        assert_eq!(audio.sample_rate, Some(44100));
        assert_eq!(audio.resampler.as_deref(), Some("linear"));
        assert_eq!(options.output.as_ref().unwrap().frame_size, 1024);
        assert!(options.overwrite);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_job_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let job = dir.path().join("job.json");
        std::fs::write(
            &job,
            r#"{ "input": { "path": "in.pcm", "codec": "pcm_u8", "sample_rate": 8000, "channels": 1 },
                 "output": { "path": "out.pcm" } }"#,
        )
        .unwrap();
        let path = job.to_string_lossy().to_string();
        let options = parse(&["--job", &path, "-t", "2", "-y"]).options().unwrap();
        assert_eq!(options.threads, Some(2));
        assert!(options.overwrite);
        assert_eq!(options.input.unwrap().codec, CodecId::PcmU8);
    }

    #[test]
    fn test_missing_job_file_is_reported() {
        let err = parse(&["--job", "/nonexistent/job.json"]).options().unwrap_err();
        assert!(err.to_string().contains("reading job file"));
    }
}
