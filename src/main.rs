use clap::{Parser, Subcommand};
use goal_coach_rs::{
    audio::{capture::CaptureConfig, CpalCapture, CpalPlayback, PlaybackConfig},
    config::{load_config, LiveKitCredentials, VideoConfig, VideoCredentials},
    dialogue::OpenAiChat,
    error::{CoachError, Result as CoachResult},
    livekit,
    plan::{ActionPlan, PlanConfig, PlanExtractor, PlanMode},
    relay::RealtimeRelay,
    session::{self, SessionCommand, SessionEvent, VoiceSession},
    stt::OpenAiTranscriber,
    tts::{OpenAiTts, TtsConfig},
    video::{BucketStore, FalQueue, VideoPipeline},
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "goal-coach", about = "Voice-driven goal coaching sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an interactive turn-based coaching session on this terminal
    Session {
        /// Portrait image URL; when set, a talking-head summary video is
        /// generated after the session
        #[arg(long)]
        image_url: Option<String>,
    },
    /// Run the realtime full-duplex relay server
    Relay {
        #[arg(long, default_value = "127.0.0.1:8787")]
        listen: String,
    },
    /// Run the two-stage video pipeline once
    Video {
        #[arg(long)]
        script: String,
        #[arg(long)]
        image_url: String,
    },
    /// Extract an action plan from a transcript file (one line per entry)
    Plan {
        #[arg(long)]
        file: std::path::PathBuf,
    },
    /// Issue a LiveKit access token for a room
    Token {
        #[arg(long)]
        room: String,
    },
}

#[tokio::main]
async fn main() -> CoachResult<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Session { image_url } => run_session(image_url).await,
        Command::Relay { listen } => run_relay(&listen).await,
        Command::Video { script, image_url } => run_video(&script, &image_url).await,
        Command::Plan { file } => run_plan(&file).await,
        Command::Token { room } => run_token(&room),
    }
}

async fn run_session(image_url: Option<String>) -> CoachResult<()> {
    let api_config = load_config()?;
    let api_key = api_config.openai_key().to_string();

    let transcriber = Arc::new(OpenAiTranscriber::new(api_key.clone()));
    let dialogue = Arc::new(OpenAiChat::new(api_key.clone()));
    let synthesizer = Arc::new(OpenAiTts::new(api_key.clone()));
    let input = Box::new(CpalCapture::new(CaptureConfig::default()));
    let output = Arc::new(CpalPlayback::new(PlaybackConfig::default())?);

    let voice_session = VoiceSession::new(transcriber, dialogue, synthesizer, input, output);

    let (command_tx, command_rx) = mpsc::channel::<SessionCommand>(8);
    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(8);

    let session_handle = tokio::spawn(session::run(voice_session, command_rx, event_tx));

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                SessionEvent::Greeted(text) => println!("🗣️  Coach: {}", text),
                SessionEvent::RecordingStarted => {
                    println!("🎤 Recording - press Enter to stop")
                }
                SessionEvent::TurnCompleted(outcome) => {
                    println!("   You said: {}", outcome.user_text);
                    println!("🗣️  Coach: {}", outcome.assistant_text);
                }
                SessionEvent::TurnFailed(reason) => println!("❌ Turn failed: {}", reason),
                SessionEvent::Rejected(reason) => println!("⚠️  {}", reason),
                SessionEvent::Ended(_) => println!("✅ Session ended"),
            }
        }
    });

    println!("🎧 Press Enter to record, Enter again to stop, type 'end' to finish");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut recording = false;
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().eq_ignore_ascii_case("end") {
            let _ = command_tx.send(SessionCommand::EndSession).await;
            break;
        }
        let command = if recording {
            SessionCommand::FinishTurn
        } else {
            SessionCommand::StartRecording
        };
        recording = !recording;
        if command_tx.send(command).await.is_err() {
            break;
        }
    }
    drop(command_tx);

    let snapshot = session_handle
        .await
        .map_err(|e| CoachError::Session(format!("Session task failed: {}", e)))??;
    printer.abort();

    if snapshot.is_empty() {
        println!("No transcript captured, skipping plan extraction");
        return Ok(());
    }

    let extractor = PlanExtractor::new(api_key.clone());
    match extractor.extract(&snapshot).await? {
        ActionPlan::Structured(plan) => {
            println!("\n🎯 Goal: {}", plan.main_goal);
            println!("   {}", plan.description);
            for (i, task) in plan.daily_tasks.iter().enumerate() {
                println!("   {}. {}", i + 1, task);
            }
        }
        ActionPlan::Script(script) => println!("\n📜 {}", script),
    }

    if let Some(image_url) = image_url {
        let script_extractor = PlanExtractor::with_config(
            api_key.clone(),
            PlanConfig {
                mode: PlanMode::Script,
                ..PlanConfig::default()
            },
        );
        let ActionPlan::Script(script) = script_extractor.extract(&snapshot).await? else {
            return Err(CoachError::Session("Expected a script plan".to_string()));
        };
        run_video(&script, &image_url).await?;
    }

    Ok(())
}

async fn run_relay(listen: &str) -> CoachResult<()> {
    let api_config = load_config()?;
    let relay = RealtimeRelay::new(api_config.openai_key().to_string());

    let listener = tokio::net::TcpListener::bind(listen).await?;
    let shutdown = CancellationToken::new();

    let shutdown_on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_on_ctrl_c.cancel();
        }
    });

    relay.serve(listener, shutdown).await
}

async fn run_video(script: &str, image_url: &str) -> CoachResult<()> {
    let api_config = load_config()?;
    let video_credentials = VideoCredentials::load()?;

    let synthesizer = Arc::new(OpenAiTts::with_config(
        api_config.openai_key().to_string(),
        TtsConfig::mp3(),
    ));
    let store = Arc::new(BucketStore::from_credentials(&video_credentials));
    let queue = Arc::new(FalQueue::new(video_credentials.fal_key().to_string()));

    let pipeline = VideoPipeline::new(synthesizer, store, queue, VideoConfig::default());
    let outcome = pipeline.generate(script, image_url).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome)
            .map_err(|e| CoachError::Session(format!("Failed to render outcome: {}", e)))?
    );
    if !outcome.success {
        if let Some(audio_url) = outcome.audio_url {
            println!("🎧 Audio is still available for manual use: {}", audio_url);
        }
    }
    Ok(())
}

async fn run_plan(file: &std::path::Path) -> CoachResult<()> {
    let api_config = load_config()?;
    let contents = tokio::fs::read_to_string(file).await?;
    let transcript: Vec<String> = contents.lines().map(str::to_string).collect();

    let extractor = PlanExtractor::new(api_config.openai_key().to_string());
    match extractor.extract(&transcript).await? {
        ActionPlan::Structured(plan) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&plan)
                    .map_err(|e| CoachError::PlanParse(e.to_string()))?
            );
        }
        ActionPlan::Script(script) => println!("{}", script),
    }
    Ok(())
}

fn run_token(room: &str) -> CoachResult<()> {
    let credentials = LiveKitCredentials::load()?;
    let grant = livekit::issue_token(&credentials, room)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&grant)
            .map_err(|e| CoachError::Token(format!("Failed to render grant: {}", e)))?
    );
    Ok(())
}
