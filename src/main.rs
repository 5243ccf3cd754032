use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use script_narrator::api::{ApiServer, ApiState};
use script_narrator::audio::{self, AudioBuffer, MicrophoneCapture};
use script_narrator::duplex::{
    DuplexSession, GeminiLiveConnector, SessionEvent, SessionState, SystemAudio,
};
use script_narrator::io;
use script_narrator::narration::{NarrationOrchestrator, ProductionRequest};
use script_narrator::providers::{ProviderKind, build_provider};
use script_narrator::translation::GeminiTranslator;
use script_narrator::Config;
use script_narrator::voice::{ModelTier, VoiceSelection};

/// Narrator - turn scripts into narrated audio and talk to a live voice model
#[derive(Parser)]
#[command(name = "narrator", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// How the voice is chosen on the command line
#[derive(clap::Args)]
struct VoiceArgs {
    /// Prebuilt voice name
    #[arg(long, default_value = script_narrator::voice::DEFAULT_VOICE)]
    voice: String,

    /// External voice id (clone services)
    #[arg(long)]
    voice_id: Option<String>,

    /// Profiles JSON file to pick a custom identity from
    #[arg(long, requires = "profile_name")]
    profiles: Option<PathBuf>,

    /// Name of the custom identity in the profiles file
    #[arg(long)]
    profile_name: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Narrate a script file (plain text or JSON) into one audio file
    Narrate {
        /// Script file
        file: PathBuf,
        /// Speech provider (gemini, elevenlabs, fish-audio)
        #[arg(short, long, default_value = "gemini")]
        provider: ProviderKind,
        #[command(flatten)]
        voice: VoiceArgs,
        /// Model tier (flash or pro)
        #[arg(short, long, default_value = "flash")]
        tier: ModelTier,
        /// Target language code
        #[arg(short, long)]
        language: Option<String>,
        /// Pronunciation rules JSON file
        #[arg(short, long)]
        rules: Option<PathBuf>,
        /// Output directory
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Play the result when done
        #[arg(long)]
        play: bool,
    },
    /// Start a live duplex voice session (Ctrl-C to end)
    Live {
        #[command(flatten)]
        voice: VoiceArgs,
    },
    /// Run the HTTP API
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Play a WAV or MP3 file
    Play {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,script_narrator=info",
        1 => "info,script_narrator=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Narrate {
            file,
            provider,
            voice,
            tier,
            language,
            rules,
            out,
            play,
        } => {
            narrate(NarrateArgs {
                file,
                provider,
                voice,
                tier,
                language,
                rules,
                out,
                play,
            })
            .await
        }
        Command::Live { voice } => live(&voice).await,
        Command::Serve { port } => serve(port).await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::Play { file } => play_file(&file).await,
    }
}

struct NarrateArgs {
    file: PathBuf,
    provider: ProviderKind,
    voice: VoiceArgs,
    tier: ModelTier,
    language: Option<String>,
    rules: Option<PathBuf>,
    out: Option<PathBuf>,
    play: bool,
}

fn voice_selection(args: &VoiceArgs) -> anyhow::Result<VoiceSelection> {
    if let Some(voice_id) = &args.voice_id {
        return Ok(VoiceSelection::External {
            voice_id: voice_id.clone(),
        });
    }

    if let (Some(path), Some(name)) = (&args.profiles, &args.profile_name) {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let profile = io::import_profiles(&json)?
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .with_context(|| format!("no profile named '{name}' in {}", path.display()))?;
        return Ok(VoiceSelection::Custom { profile });
    }

    Ok(VoiceSelection::prebuilt(&args.voice)?)
}

async fn narrate(args: NarrateArgs) -> anyhow::Result<()> {
    let config = Config::load();

    let content = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;

    let is_json = args
        .file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let mut script = if is_json {
        io::import_script(&content)?
    } else {
        io::ScriptFile {
            script: content,
            ..io::ScriptFile::default()
        }
    };

    if let Some(path) = &args.rules {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        script.rules.extend(io::import_rules(&json)?);
    }

    let voice = voice_selection(&args.voice)?;
    let provider = build_provider(args.provider, &config, args.tier)?;

    let mut orchestrator = NarrationOrchestrator::new(config.narration.clone());
    if let Ok(translator) = GeminiTranslator::from_config(&config) {
        orchestrator = orchestrator.with_translator(Arc::new(translator));
    }
    let orchestrator = Arc::new(orchestrator);

    // Progress output
    let mut states = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let status = states.borrow_and_update().status_text();
            println!("  {status}");
        }
    });

    let abort_handle = Arc::clone(&orchestrator);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort_handle.abort();
        }
    });

    println!("Narrating {} with {}...", args.file.display(), args.provider);
    let result = orchestrator
        .produce(
            provider.as_ref(),
            ProductionRequest {
                script: script.script,
                rules: script.rules,
                voice,
                language: args.language.or(script.language),
            },
        )
        .await;

    ctrl_c.abort();
    progress.abort();
    let artifact = result?;

    let dir = args.out.unwrap_or_else(|| config.narration.output_dir.clone());
    let prefix = args
        .file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("narration");
    let path = artifact.write_to(&dir, prefix).await?;

    println!(
        "Wrote {} ({} chunks, {} bytes)",
        path.display(),
        artifact.chunk_count,
        artifact.bytes.len()
    );

    if args.play {
        play_file(&path).await?;
    }

    Ok(())
}

async fn live(args: &VoiceArgs) -> anyhow::Result<()> {
    let config = Config::load();
    let voice = voice_selection(args)?;
    let connector = GeminiLiveConnector::from_config(&config)?;

    let (mut session, mut events) =
        DuplexSession::new(Arc::new(connector), Arc::new(SystemAudio), config.live.clone());

    session.start(&voice).await?;
    println!("Live session started with {} - speak now, Ctrl-C to stop\n", voice.base_voice());

    let mut printed = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(SessionEvent::Transcript(lines)) => {
                    for line in lines.iter().skip(printed).take_while(|l| l.is_final) {
                        println!("{:?}: {}", line.speaker, line.text);
                        printed += 1;
                    }
                }
                Some(SessionEvent::Error(message)) => eprintln!("error: {message}"),
                Some(SessionEvent::State(SessionState::Closed)) | None => break,
                Some(SessionEvent::State(_)) => {}
            },
        }
    }

    session.stop().await;
    println!("\nSession closed");
    Ok(())
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let config = Arc::new(Config::load());
    let port = port.unwrap_or(config.server.port);

    let state = ApiState::from_config(Arc::clone(&config));
    if state.configured.is_empty() {
        tracing::warn!("no provider API keys configured; narration requests will fail");
    }

    ApiServer::new(state, port).run().await?;
    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut capture = MicrophoneCapture::open(
        audio::CAPTURE_SAMPLE_RATE,
        audio::DEFAULT_FRAME_SAMPLES / 4,
        tx,
    )?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut samples = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            samples.extend(frame);
        }
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = audio::PLAYBACK_SAMPLE_RATE;
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    audio::play(&AudioBuffer {
        samples,
        sample_rate,
        channels: 1,
    })
    .await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Play a narrated artifact
async fn play_file(path: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let buffer = if bytes.starts_with(b"RIFF") {
        audio::decode_wav(&bytes)?
    } else {
        audio::decode_mp3(&bytes)?
    };

    println!("Playing {} ({:.1}s)...", path.display(), buffer.duration());
    audio::play(&buffer).await?;
    Ok(())
}
