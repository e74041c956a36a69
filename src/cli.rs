//! Command-line interface for intervox
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Live mock-interview voice sessions with an AI interviewer
#[derive(Parser, Debug)]
#[command(name = "intervox", version, about = "Live mock interviews over voice")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: live transcript, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (e.g., hw:0)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Audio output device
    #[arg(long, value_name = "DEVICE")]
    pub output_device: Option<String>,

    /// Interviewer voice name
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Interviewer speaking-rate multiplier (0.5-1.5)
    #[arg(long, value_name = "RATE")]
    pub rate: Option<f32>,

    /// Agent model identifier override
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Role being interviewed for (e.g., "Senior Backend Engineer")
    #[arg(long, value_name = "ROLE")]
    pub role: Option<String>,

    /// Company conducting the mock interview
    #[arg(long, value_name = "COMPANY")]
    pub company: Option<String>,

    /// Path to a job description text file
    #[arg(long, value_name = "FILE")]
    pub job_description: Option<PathBuf>,

    /// Path to a resume/background text file
    #[arg(long, value_name = "FILE")]
    pub resume: Option<PathBuf>,

    /// End the session after this duration. Examples: 30s, 5m, 1h30m
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
    pub max_duration: Option<u64>,
}

/// Parse a duration string into seconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers
/// (seconds), single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`).
fn parse_duration_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs())
        .map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input and output devices
    Devices,

    /// Dump the effective configuration as TOML
    Config,
}
