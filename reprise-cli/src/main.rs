//! Reprise command-line host.
//!
//! Owns the one process-wide `ClipProcessor` and exposes the engine over
//! five subcommands:
//!
//! ```text
//! reprise analyze <audio>                      speech boundaries as JSON
//! reprise trim    <audio> -o <out.wav>         trim edge silence
//! reprise align   <target> <attempt> -o <dir>  onset-align a pair
//! reprise levels  <audio> [<audio2>]           levels (and gains for a pair)
//! reprise settings [--write]                   show or persist settings
//! ```
//!
//! Metadata goes to stdout as JSON; diagnostics go to stderr via `tracing`.

mod settings;

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{bail, Context, Result};
use reprise_core::{ClipProcessor, PracticeSettings};
use tracing::info;

use settings::{default_settings_path, load_settings, save_settings};

const USAGE: &str = "\
Usage: reprise <command> [options]

Commands:
  analyze  <audio>                       Detect speech boundaries
  trim     <audio> -o <out.wav>          Trim edge silence
  align    <target> <attempt> -o <dir>   Onset-align a clip pair
  levels   <audio> [<audio2>]            Measure levels (gains for a pair)
  settings [--write]                     Show (or persist) settings

Options:
  --settings <file>   Settings file (default: platform data dir)
  -o, --out <path>    Output file or directory
  -h, --help          Show this help";

#[derive(Debug)]
struct Args {
    command: String,
    inputs: Vec<PathBuf>,
    out: Option<PathBuf>,
    settings_path: Option<PathBuf>,
    write: bool,
}

fn parse_args() -> Result<Args> {
    let mut command = None;
    let mut inputs = Vec::new();
    let mut out = None;
    let mut settings_path = None;
    let mut write = false;

    let mut it = std::env::args().skip(1).peekable();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-o" | "--out" => {
                let Some(v) = it.next() else {
                    bail!("missing value for {arg}");
                };
                out = Some(PathBuf::from(v));
            }
            "--settings" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --settings");
                };
                settings_path = Some(PathBuf::from(v));
            }
            "--write" => write = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            other => {
                if command.is_none() {
                    command = Some(other.to_string());
                } else {
                    inputs.push(PathBuf::from(other));
                }
            }
        }
    }

    let Some(command) = command else {
        bail!("no command given\n\n{USAGE}");
    };
    Ok(Args {
        command,
        inputs,
        out,
        settings_path,
        write,
    })
}

fn read_clip(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read audio {}", path.display()))
}

/// Blob timestamp for the level cache: file mtime in milliseconds.
fn blob_timestamp_ms(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_analyze(processor: &ClipProcessor, args: &Args) -> Result<()> {
    let [input] = args.inputs.as_slice() else {
        bail!("analyze expects exactly one audio file");
    };
    let boundaries = processor.detect_speech_boundaries(read_clip(input)?).await;
    print_json(&boundaries)
}

async fn run_trim(processor: &ClipProcessor, args: &Args) -> Result<()> {
    let [input] = args.inputs.as_slice() else {
        bail!("trim expects exactly one audio file");
    };
    let Some(out) = &args.out else {
        bail!("trim requires -o <out.wav>");
    };

    let result = processor.trim_silence(read_clip(input)?).await?;
    std::fs::write(out, &result.wav).with_context(|| format!("write {}", out.display()))?;
    info!(out = %out.display(), "wrote trimmed clip");
    print_json(&result)
}

async fn run_align(processor: &ClipProcessor, args: &Args) -> Result<()> {
    let [target, attempt] = args.inputs.as_slice() else {
        bail!("align expects <target> <attempt>");
    };
    let Some(out_dir) = &args.out else {
        bail!("align requires -o <dir>");
    };
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("create {}", out_dir.display()))?;

    let result = processor
        .align_pair(read_clip(target)?, read_clip(attempt)?)
        .await;

    let target_out = out_dir.join("target_aligned.wav");
    let attempt_out = out_dir.join("attempt_aligned.wav");
    std::fs::write(&target_out, &result.target_wav)
        .with_context(|| format!("write {}", target_out.display()))?;
    std::fs::write(&attempt_out, &result.attempt_wav)
        .with_context(|| format!("write {}", attempt_out.display()))?;
    info!(
        target = %target_out.display(),
        attempt = %attempt_out.display(),
        "wrote aligned pair"
    );
    print_json(&result.info)
}

async fn run_levels(processor: &ClipProcessor, args: &Args) -> Result<()> {
    match args.inputs.as_slice() {
        [input] => {
            let info = processor
                .measure_levels(read_clip(input)?, "target", blob_timestamp_ms(input))
                .await?;
            print_json(&info)
        }
        [target, user] => {
            let target_info = processor
                .measure_levels(read_clip(target)?, "target", blob_timestamp_ms(target))
                .await?;
            let user_info = processor
                .measure_levels(read_clip(user)?, "user", blob_timestamp_ms(user))
                .await?;
            let gains = processor.normalization_gains(&target_info, &user_info);

            #[derive(serde::Serialize)]
            #[serde(rename_all = "camelCase")]
            struct LevelsReport<'a> {
                target: &'a reprise_core::AudioLevelInfo,
                user: &'a reprise_core::AudioLevelInfo,
                gains: reprise_core::GainPair,
            }
            print_json(&LevelsReport {
                target: &target_info,
                user: &user_info,
                gains,
            })
        }
        _ => bail!("levels expects one or two audio files"),
    }
}

fn run_settings(path: &Path, current: &PracticeSettings, write: bool) -> Result<()> {
    if write {
        save_settings(path, current)
            .with_context(|| format!("write settings {}", path.display()))?;
        info!(path = %path.display(), "settings written");
    }
    print_json(current)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let settings_path = args
        .settings_path
        .clone()
        .unwrap_or_else(default_settings_path);
    let practice_settings = load_settings(&settings_path);
    let processor = ClipProcessor::new(practice_settings.processor_config());

    match args.command.as_str() {
        "analyze" => run_analyze(&processor, &args).await,
        "trim" => run_trim(&processor, &args).await,
        "align" => run_align(&processor, &args).await,
        "levels" => run_levels(&processor, &args).await,
        "settings" => run_settings(&settings_path, &practice_settings, args.write),
        other => bail!("unknown command: {other}\n\n{USAGE}"),
    }
}
