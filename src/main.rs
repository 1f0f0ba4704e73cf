use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use voice_command::dispatch::{CommandDispatcher, HttpDispatcher, Record, Reply};
use voice_command::session::{Phase, Rejection, SessionState, StructuredResult};
use voice_command::voice::{
    ConsoleOutput, Locale, SUPPORTED_LANGUAGES, SpeechInputFactory, SpeechOutput,
    UnavailableInput,
};
use voice_command::{Config, Session, SessionHandle};

/// voicecmd - Speak or type commands to a workflow webhook
#[derive(Parser)]
#[command(name = "voicecmd", version, about)]
struct Cli {
    /// Webhook URL commands are posted to
    #[arg(short, long, env = "VOICECMD_ENDPOINT")]
    endpoint: Option<String>,

    /// Recognition and synthesis language (e.g. "th-TH", "en-US")
    #[arg(short, long, env = "VOICECMD_LANGUAGE")]
    language: Option<Locale>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable microphone and speaker, print replies instead
    #[arg(long, env = "VOICECMD_DISABLE_AUDIO")]
    disable_audio: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session (default)
    Run,
    /// Dispatch a single command and print the reply
    Send {
        /// Command text
        text: String,
    },
    /// List supported languages
    Languages,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voice_command=info",
        1 => "info,voice_command=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if matches!(cli.command, Some(Command::Languages)) {
        for option in SUPPORTED_LANGUAGES {
            println!("{:<6}  {}", option.code, option.name);
        }
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(language) = cli.language {
        config.language = language;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Command::Send { text }) => send(&config, &text).await,
        Some(Command::Run) | None => interactive(&config, cli.disable_audio).await,
        Some(Command::Languages) => Ok(()),
    }
}

/// Dispatch one command without a session
async fn send(config: &Config, text: &str) -> anyhow::Result<()> {
    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("command is empty");
    }

    let dispatcher = HttpDispatcher::from_config(config)?;
    match dispatcher.dispatch(text).await? {
        Reply::Spoken(text) => println!("{text}"),
        Reply::Chart(rows) | Reply::Table(rows) | Reply::Both(rows) => print_records(&rows),
    }

    Ok(())
}

/// Pick recognizer and synthesizer for this host
fn adapters(
    config: &Config,
    disable_audio: bool,
) -> (Arc<dyn SpeechInputFactory>, Box<dyn SpeechOutput>) {
    if disable_audio {
        return (
            Arc::new(UnavailableInput::new("audio disabled")),
            Box::new(ConsoleOutput::stdout()),
        );
    }

    #[cfg(feature = "native-audio")]
    {
        use voice_command::voice::{MicrophoneFactory, SpeakerOutput};

        let input: Arc<dyn SpeechInputFactory> = match config.speech_to_text() {
            Ok(stt) => Arc::new(MicrophoneFactory::new(stt)),
            Err(e) => {
                tracing::warn!(error = %e, "speech recognition unavailable");
                Arc::new(UnavailableInput::new(e.to_string()))
            }
        };

        let output: Box<dyn SpeechOutput> = match config
            .text_to_speech()
            .map_err(|e| e.to_string())
            .and_then(|tts| SpeakerOutput::new(tts).map_err(|e| e.to_string()))
        {
            Ok(speaker) => Box::new(speaker),
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis unavailable, printing replies");
                Box::new(ConsoleOutput::stdout())
            }
        };

        (input, output)
    }

    #[cfg(not(feature = "native-audio"))]
    {
        let _ = config;
        (
            Arc::new(UnavailableInput::new("built without native-audio")),
            Box::new(ConsoleOutput::stdout()),
        )
    }
}

/// Interactive session on stdin
async fn interactive(config: &Config, disable_audio: bool) -> anyhow::Result<()> {
    let dispatcher = Arc::new(HttpDispatcher::from_config(config)?);
    let (input, output) = adapters(config, disable_audio);
    let session = Session::spawn(config, input, output, dispatcher);

    let printer = tokio::spawn(print_changes(session.clone()));

    println!("voicecmd: {} ({})", config.endpoint, config.language);
    println!("type a command, or :listen :stop :replay :lang <code> :rate/:pitch/:volume <x> :reset :quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match handle_line(&session, line.trim()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("✗ {e}"),
                }
            }
        }
    }

    session.shutdown().await?;
    printer.abort();
    Ok(())
}

/// Apply one input line; returns `false` to quit
async fn handle_line(session: &SessionHandle, line: &str) -> anyhow::Result<bool> {
    let (command, arg) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(c, a)| (c, a.trim()));

    let rejection = match command {
        "" => return Ok(true),
        ":quit" | ":q" => return Ok(false),
        ":listen" | ":l" => session.start_listening().await?,
        ":stop" | ":s" => {
            if session.state().phase == Phase::Speaking {
                session.stop_speaking().await?
            } else {
                session.stop_listening().await?
            }
        }
        ":replay" | ":r" => session.replay().await?,
        ":lang" => session.change_language(arg.parse()?).await?,
        ":rate" => session.set_rate(arg.parse()?).await?,
        ":pitch" => session.set_pitch(arg.parse()?).await?,
        ":volume" => session.set_volume(arg.parse()?).await?,
        ":reset" => session.reset_voice_params().await?,
        ":status" => {
            let state = session.state();
            println!(
                "{} | {} | rate {:.1} pitch {:.1} volume {:.1}",
                state.status().label(),
                state.language,
                state.voice.rate(),
                state.voice.pitch(),
                state.voice.volume()
            );
            None
        }
        other if other.starts_with(':') => anyhow::bail!("unknown command {other}"),
        _ => session.submit(line).await?,
    };

    match rejection {
        Some(Rejection::Busy(phase)) => println!("… busy ({phase:?})"),
        Some(Rejection::NothingToReplay) => println!("… nothing to replay"),
        _ => {}
    }

    Ok(true)
}

/// Print state changes as they happen
async fn print_changes(session: SessionHandle) {
    let mut rx = session.subscribe();
    let mut previous = rx.borrow_and_update().clone();

    while rx.changed().await.is_ok() {
        let current = rx.borrow_and_update().clone();
        render(&previous, &current);
        previous = current;
    }
}

fn render(previous: &SessionState, current: &SessionState) {
    if current.phase != previous.phase {
        match current.phase {
            Phase::Listening => println!("🎤 {}", current.status().label()),
            Phase::Processing => println!("→ {}", current.transcript),
            Phase::Speaking | Phase::Idle => {}
        }
    }

    if current.structured != previous.structured {
        match &current.structured {
            StructuredResult::Chart(rows) => {
                println!("📈 chart");
                print_records(rows);
            }
            StructuredResult::Table(rows) => {
                println!("📋 table");
                print_records(rows);
            }
            StructuredResult::Both(rows) => {
                println!("📈📋 chart and table");
                print_records(rows);
            }
            StructuredResult::None => {}
        }
    }

    if let Some(error) = current.error.as_ref().filter(|_| current.error != previous.error) {
        println!("✗ {error}");
    }

    if current.language != previous.language {
        println!("language: {}", current.language);
    }
}

fn print_records(rows: &[Record]) {
    if rows.is_empty() {
        println!("  (no records)");
        return;
    }

    for row in rows {
        let date = row
            .date()
            .map_or_else(|| row.date_str().unwrap_or("-").to_string(), |d| d.to_string());
        let series = row
            .series()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("  ");
        println!("  {date:<10}  {series}");
    }
}
