use anyhow::{Context as _, Result};
use clap::Parser;
use intervox::audio::capture::{list_devices, Microphone};
use intervox::audio::playback::{PlaybackScheduler, Speaker};
use intervox::cli::{Cli, Commands};
use intervox::config::Config;
use intervox::session::{InterviewSession, Phase};
use intervox::transport::{LiveConnector, SessionContext};
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    intervox::audio::capture::suppress_audio_warnings();

    match cli.command {
        None => {
            let config = load_config(&cli)?;
            run_interview(config, &cli).await?;
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Config) => {
            let config = load_config(&cli)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Route logs through tracing; RUST_LOG wins when set.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "intervox=warn",
        1 => "intervox=info",
        _ => "intervox=debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration and apply CLI overrides on top.
///
/// Priority order:
/// 1. Command-line flags
/// 2. Environment variable overrides
/// 3. Custom config path from CLI (--config)
/// 4. Default config path (~/.config/intervox/config.toml)
/// 5. Built-in defaults
fn load_config(cli: &Cli) -> Result<Config> {
    let config = if let Some(path) = cli.config.as_deref() {
        Config::load(path)?
    } else {
        let default_path = Config::default_path()?;
        Config::load_or_default(&default_path)?
    };

    let mut config = config.with_env_overrides();
    if let Some(device) = &cli.device {
        config.audio.input_device = Some(device.clone());
    }
    if let Some(device) = &cli.output_device {
        config.audio.output_device = Some(device.clone());
    }
    if let Some(voice) = &cli.voice {
        config.agent.voice = voice.clone();
    }
    if let Some(rate) = cli.rate {
        config.agent.speaking_rate = rate;
    }
    if let Some(model) = &cli.model {
        config.agent.model = model.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Assemble the interviewer persona from role, company, and background files.
fn build_persona(cli: &Cli) -> Result<String> {
    let role = cli.role.as_deref().unwrap_or("Software Engineer");
    let mut persona = format!(
        "You are an experienced interviewer conducting a live mock interview \
         for a {} position. Ask one question at a time, listen to the answer, \
         and follow up naturally. After each substantial answer, record \
         feedback with the record_feedback tool before continuing.",
        role
    );
    if let Some(company) = &cli.company {
        persona.push_str(&format!(" The interview is for {}.", company));
    }
    if let Some(path) = &cli.job_description {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read job description: {}", path.display()))?;
        persona.push_str(&format!("\n\nJob description:\n{}", text.trim()));
    }
    if let Some(path) = &cli.resume {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read resume: {}", path.display()))?;
        persona.push_str(&format!("\n\nCandidate background:\n{}", text.trim()));
    }
    Ok(persona)
}

async fn run_interview(config: Config, cli: &Cli) -> Result<()> {
    let api_key = std::env::var(&config.agent.api_key_env).with_context(|| {
        format!(
            "API key not found; set the {} environment variable",
            config.agent.api_key_env
        )
    })?;

    let context = SessionContext::new(build_persona(cli)?)
        .with_voice(&config.agent.voice)
        .with_speaking_rate(config.agent.speaking_rate)
        .with_model(&config.agent.model);

    let microphone = Microphone::new(config.audio.input_device.as_deref())?;
    let speaker = Speaker::open(
        config.audio.output_device.as_deref(),
        config.audio.output_sample_rate,
    )?;
    let scheduler = PlaybackScheduler::new(
        speaker.queue(),
        speaker.queue(),
        config.audio.output_sample_rate,
    );
    let connector = Arc::new(LiveConnector::new(&config.agent.endpoint, api_key));

    let session = InterviewSession::new(connector, Box::new(microphone), scheduler);
    session.start(&context).await?;

    if !cli.quiet {
        eprintln!(
            "{} Interview started. Speak when ready; press Ctrl-C to end.",
            "●".green()
        );
    }

    wait_for_session_end(&session, cli.max_duration).await?;
    speaker.close();

    let state = session.state().await;
    if !cli.quiet {
        print_transcript(&state.turns);
        print_report(&state);
    }
    if let Some(error) = &state.last_error {
        anyhow::bail!("session ended abnormally: {}", error);
    }
    Ok(())
}

/// Block until Ctrl-C, the optional time limit, or a remote disconnect.
async fn wait_for_session_end<C, S>(
    session: &InterviewSession<C, S>,
    max_duration: Option<u64>,
) -> Result<()>
where
    C: intervox::audio::playback::OutputClock + 'static,
    S: intervox::audio::playback::PlaybackSink + 'static,
{
    let time_limit = async {
        match max_duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nEnding interview...");
        }
        _ = time_limit => {
            eprintln!("\nTime limit reached, ending interview...");
        }
        _ = wait_for_idle(session) => {
            // Remote close already tore the session down.
            return Ok(());
        }
    }

    session.stop().await?;
    wait_for_idle(session).await;
    Ok(())
}

/// Poll until the controller returns to idle.
async fn wait_for_idle<C, S>(session: &InterviewSession<C, S>)
where
    C: intervox::audio::playback::OutputClock + 'static,
    S: intervox::audio::playback::PlaybackSink + 'static,
{
    while session.phase().await != Phase::Idle {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn print_transcript(turns: &[intervox::transcript::TranscriptTurn]) {
    use intervox::transcript::Speaker as Who;

    if turns.is_empty() {
        return;
    }
    println!("\n{}", "── Transcript ──".bold());
    for turn in turns {
        match turn.speaker {
            Who::Interviewer => println!("{} {}", "Interviewer:".cyan().bold(), turn.text),
            Who::Candidate => println!("{} {}", "You:".green().bold(), turn.text),
        }
    }
}

fn print_report(state: &intervox::session::SessionState) {
    let Some(report) = &state.report else {
        println!("\n{}", "No feedback was recorded this session.".dimmed());
        return;
    };

    println!("\n{}", "── Feedback ──".bold());
    println!("Score: {}", format!("{}/100", report.score).bold());
    if !report.strengths.is_empty() {
        println!("{}", "Strengths:".green());
        for item in &report.strengths {
            println!("  • {}", item);
        }
    }
    if !report.areas_for_improvement.is_empty() {
        println!("{}", "Areas for improvement:".yellow());
        for item in &report.areas_for_improvement {
            println!("  • {}", item);
        }
    }
}

fn list_audio_devices() -> Result<()> {
    use cpal::traits::{DeviceTrait, HostTrait};

    println!("{}", "Input devices:".bold());
    for name in list_devices()? {
        println!("  {}", name);
    }

    println!("{}", "Output devices:".bold());
    let host = cpal::default_host();
    for device in host.output_devices()? {
        if let Ok(name) = device.name() {
            println!("  {}", name);
        }
    }
    Ok(())
}
