use anyhow::Result;
use askdoc::api::ApiClient;
use askdoc::config::Config;
use askdoc::logging::init_logging;
use askdoc::media::{
    format_timestamp, BindingId, PlaybackElement, PlaybackTracker, PlayerBinding,
    SimulatedPlayer, TimestampIndex,
};
use askdoc::state::{ConversationSession, ConversationUpdate, SessionRegistry, TurnOutcome};
use askdoc::types::{Message, Role};
use clap::Parser;
use crossterm::style::Stylize;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "askdoc", about = "Ask questions about an uploaded document or media file")]
struct Args {
    /// Id of the uploaded file to talk about.
    file_id: String,

    /// Backend base URL, e.g. http://localhost:8000/api/v1
    #[arg(long, env = "ASKDOC_API_URL")]
    api_url: Option<String>,

    /// Length of the media in seconds. Seeks and suggested moments are clamped
    /// to it unless ASKDOC_CLAMP_SUGGESTIONS=false; without it nothing is
    /// clamped.
    #[arg(long, value_name = "SECONDS", env = "ASKDOC_MEDIA_DURATION", value_parser = parse_duration)]
    duration: Option<f64>,
}

fn parse_duration(raw: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds > 0.0 => Ok(seconds),
        _ => Err(format!("not a positive length in seconds: {raw}")),
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Quit,
    History,
    Topics,
    Jump,
    Seek(f64),
    Ask(String),
    Invalid(String),
    Empty,
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if !line.starts_with('/') {
        return Command::Ask(line.to_string());
    }

    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("/quit" | "/exit"), None, _) => Command::Quit,
        (Some("/history"), None, _) => Command::History,
        (Some("/topics"), None, _) => Command::Topics,
        (Some("/jump"), None, _) => Command::Jump,
        (Some("/seek"), Some(raw), None) => match raw.parse::<f64>() {
            Ok(seconds) if seconds.is_finite() => Command::Seek(seconds),
            _ => Command::Invalid(format!("not a position in seconds: {raw}")),
        },
        (Some("/seek"), _, _) => Command::Invalid("usage: /seek <seconds>".to_string()),
        (Some(other), _, _) => Command::Invalid(format!("unknown command: {other}")),
        (None, _, _) => Command::Empty,
    }
}

struct Screen {
    session: ConversationSession,
    binding: PlayerBinding,
    binding_id: BindingId,
    player: Arc<SimulatedPlayer>,
    tracker: PlaybackTracker,
}

impl Screen {
    fn new(
        session: ConversationSession,
        index: TimestampIndex,
        duration: Option<f64>,
        clamp_suggestions: bool,
    ) -> Self {
        let player = Arc::new(SimulatedPlayer::new(duration));
        let binding = PlayerBinding::new(clamp_suggestions);
        let binding_id = binding.register(player.clone());
        Self {
            session,
            binding,
            binding_id,
            player,
            tracker: PlaybackTracker::new(index),
        }
    }

    fn close(self) {
        self.binding.unregister(self.binding_id);
    }

    fn print_transcript(&self) {
        let snapshot = self.session.snapshot();
        if snapshot.messages().is_empty() {
            println!("{}", "(no messages yet)".dark_grey());
            return;
        }
        for message in snapshot.messages() {
            print_message(message);
        }
        if let Some(seconds) = self.session.jump_target() {
            print_affordance(seconds);
        }
    }

    fn print_topics(&mut self) {
        self.tracker.observe(self.player.current_time());
        let index = self.tracker.index();
        if index.is_empty() {
            println!("{}", "(no topics extracted for this file)".dark_grey());
            return;
        }
        let active = self.tracker.active();
        for (position, entry) in index.entries().iter().enumerate() {
            let marker = if Some(position) == active { "▶" } else { " " };
            let line = format!("{marker} {:>8}  {}", format_timestamp(entry.time), entry.topic);
            if Some(position) == active {
                println!("{}", line.cyan());
            } else {
                println!("{line}");
            }
        }
    }

    fn seek(&mut self, seconds: f64) -> Option<f64> {
        let applied = self.binding.seek(seconds);
        match applied {
            Some(position) => {
                println!("{}", format!("playing from {}", format_timestamp(position)).dark_grey());
                if let Some(change) = self.tracker.observe(position) {
                    if let Some(entry) = change.current.and_then(|i| self.tracker.index().get(i)) {
                        println!("{}", format!("now: {}", entry.topic).cyan());
                    }
                }
            }
            None => println!("{}", "no player is bound".red()),
        }
        applied
    }

    fn jump(&mut self) -> Option<f64> {
        match self.session.jump_target() {
            Some(seconds) => self.seek(seconds),
            None => {
                println!("{}", "the latest answer has no suggested moment".dark_grey());
                None
            }
        }
    }

    async fn ask(&mut self, question: String) {
        let (tx, rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_updates(rx));

        let result = self.session.submit(question, Some(&tx)).await;
        drop(tx);
        let _ = printer.await;

        match result {
            Ok(TurnOutcome::Completed {
                reconciled,
                suggested_timestamp: _,
            }) => {
                if !reconciled {
                    println!(
                        "{}",
                        "(answer kept locally; the server transcript could not be fetched)"
                            .dark_grey()
                    );
                }
                if let Some(seconds) = self.session.jump_target() {
                    print_affordance(seconds);
                }
            }
            Ok(TurnOutcome::Rejected) => {
                println!("{}", "still answering the previous question".dark_grey())
            }
            Err(error) => println!("{}", format!("error: {error}").red()),
        }
    }
}

async fn print_updates(mut rx: mpsc::UnboundedReceiver<ConversationUpdate>) {
    let mut stdout = std::io::stdout();
    let mut streamed = false;
    while let Some(update) = rx.recv().await {
        match update {
            ConversationUpdate::Delta(text) => {
                if !streamed {
                    print!("{} ", "assistant>".green());
                    streamed = true;
                }
                print!("{text}");
                let _ = stdout.flush();
            }
            ConversationUpdate::PhaseChanged(phase) if phase.is_idle() && streamed => {
                println!();
                streamed = false;
            }
            _ => {}
        }
    }
}

fn print_message(message: &Message) {
    let label = match message.role {
        Role::User => "you>".blue(),
        Role::Assistant => "assistant>".green(),
    };
    println!("{label} {}", message.content);
}

fn print_affordance(seconds: f64) {
    println!(
        "{}",
        format!("▶ {}  (type /jump to play from here)", format_timestamp(seconds)).cyan()
    );
}

/// Ctrl-C cancels the turn in flight; with nothing to cancel it asks the
/// prompt loop to quit. Returns `false` once the prompt loop is gone.
fn handle_interrupt(session: &ConversationSession, quit_tx: &mpsc::UnboundedSender<()>) -> bool {
    if session.cancel_turn() {
        tracing::info!("turn cancelled from the keyboard");
        return true;
    }
    quit_tx.send(()).is_ok()
}

fn spawn_interrupt_handler(session: ConversationSession) -> mpsc::UnboundedReceiver<()> {
    let (quit_tx, quit_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !handle_interrupt(&session, &quit_tx) {
                break;
            }
        }
    });
    quit_rx
}

async fn load_topics(client: &ApiClient, file_id: &str) -> TimestampIndex {
    match client.fetch_timestamps(file_id).await {
        Ok(Some(response)) => TimestampIndex::from_response(response),
        Ok(None) => TimestampIndex::default(),
        Err(error) => {
            tracing::warn!(file_id, error = %error, "could not load timestamps");
            eprintln!("{}", format!("topics unavailable: {error}").dark_grey());
            TimestampIndex::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    let mut config = Config::load()?;
    if let Some(api_url) = args.api_url {
        config = Config::from_parts(api_url, config.access_token);
    }
    config.validate()?;

    let client = Arc::new(ApiClient::new(&config));
    let registry = SessionRegistry::new(Arc::clone(&client), config.stream_idle_timeout);
    let session = registry.session(&args.file_id);

    let index = load_topics(&client, &args.file_id).await;
    let last_topic = index.entries().last().map(|entry| entry.time);
    if config.clamp_suggestions && args.duration.is_none() {
        tracing::debug!("media duration unknown; seeks are not clamped");
    }
    let mut interrupts = spawn_interrupt_handler(session.clone());
    let mut screen = Screen::new(session, index, args.duration, config.clamp_suggestions);

    if let Err(error) = screen.session.load_history(None).await {
        eprintln!("{}", format!("history unavailable: {error}").red());
    }
    println!(
        "{}",
        format!(
            "askdoc: {} ({} topics{})",
            args.file_id,
            screen.tracker.index().len(),
            last_topic
                .map(|last| format!(", last at {}", format_timestamp(last)))
                .unwrap_or_default()
        )
        .bold()
    );
    screen.print_transcript();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", "you>".blue());
        let _ = std::io::stdout().flush();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(()) = interrupts.recv() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        match parse_command(&line) {
            Command::Quit => break,
            Command::Empty => {}
            Command::History => screen.print_transcript(),
            Command::Topics => screen.print_topics(),
            Command::Jump => {
                screen.jump();
            }
            Command::Seek(seconds) => {
                screen.seek(seconds);
            }
            Command::Invalid(message) => println!("{}", message.red()),
            Command::Ask(question) => screen.ask(question).await,
        }
    }

    screen.close();
    Ok(())
}
