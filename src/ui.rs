use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use colored::*;
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;

use crate::config::UIConfig;
use crate::event_bus::{Event, EventBus, Metrics};
use crate::session::Assistant;
use crate::transcript::{Section, Speaker, TranscriptEntry};

/// Terminal front end: header, per-turn spinner, coloured transcript lines.
pub struct TerminalUI {
    headless: bool,
    spinner_enabled: bool,
    assistant_name: String,
    spinner: Arc<RwLock<Option<ProgressBar>>>,
    event_bus: Option<Arc<EventBus>>,
    start_time: Instant,
}

impl TerminalUI {
    pub fn new(config: &UIConfig, headless: bool, assistant_name: &str) -> Self {
        colored::control::set_override(config.colorful && !headless);
        Self {
            headless,
            spinner_enabled: config.spinner && !headless,
            assistant_name: assistant_name.to_string(),
            spinner: Arc::new(RwLock::new(None)),
            event_bus: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn start(&mut self) -> Result<()> {
        if self.headless {
            return Ok(());
        }

        execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))?;
        println!("{}", "=".repeat(80).bright_blue());
        println!(
            "{}",
            format!("Smart Life Manager - {}, your AI Smart Assistant", self.assistant_name)
                .bright_white()
                .bold()
        );
        println!("{}", "=".repeat(80).bright_blue());
        println!(
            "{}",
            "Try \"add task milk\", \"weather Bangalore\" or \"go to notes\". Type exit to leave.".dimmed()
        );
        println!();

        // Spinner follows what the turn is waiting on
        if let Some(bus) = &self.event_bus {
            let spinner = self.spinner.clone();
            let mut receiver = bus.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = receiver.recv().await {
                    if let Some(message) = spinner_message(&event) {
                        if let Some(pb) = spinner.read().await.as_ref() {
                            pb.set_message(message);
                        }
                    }
                }
            });
        }

        Ok(())
    }

    async fn begin_turn(&self) {
        if !self.spinner_enabled {
            return;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("{} thinking...", self.assistant_name));
        pb.enable_steady_tick(Duration::from_millis(100));
        *self.spinner.write().await = Some(pb);
    }

    async fn end_turn(&self) {
        if let Some(pb) = self.spinner.write().await.take() {
            pb.finish_and_clear();
        }
    }

    /// Run one submission with the spinner up and print the reply.
    pub async fn turn(&self, assistant: &Assistant, input: &str) {
        self.begin_turn().await;
        let reply = assistant.submit(input).await;
        self.end_turn().await;
        match reply {
            Some(entry) => self.display_entry(&entry),
            None => debug!("Nothing to process for {:?}", input),
        }
    }

    pub fn display_entry(&self, entry: &TranscriptEntry) {
        if self.headless {
            println!("{}", entry.text);
            return;
        }
        let label = match entry.speaker {
            Speaker::User => "You:".cyan().bold(),
            Speaker::Assistant => format!("{}:", self.assistant_name).bright_green().bold(),
        };
        println!("{} {}", label, entry.text);
        println!();
    }

    pub fn display_error(&self, error: &str) {
        eprintln!("{} {}", "✗ Error:".red().bold(), error.white());
    }

    fn prompt(&self, section: Section) -> Result<()> {
        if self.headless {
            return Ok(());
        }
        print!("{} ", format!("[{}] >", section).bright_blue());
        io::stdout().flush()?;
        Ok(())
    }

    /// Read lines from stdin until EOF or `exit`.
    ///
    /// `:history` reprints the active section, `:reset` clears every section.
    pub async fn repl(&self, assistant: &Assistant) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            self.prompt(assistant.section().await)?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            match line.trim() {
                "exit" | "quit" => break,
                ":history" => {
                    for entry in assistant.history(assistant.section().await).await {
                        self.display_entry(&entry);
                    }
                }
                ":reset" => {
                    assistant.reset().await;
                    println!("{}", "History cleared.".dimmed());
                }
                input => self.turn(assistant, input).await,
            }
        }
        Ok(())
    }

    pub async fn finish(&self, assistant: &Assistant) {
        if self.headless {
            return;
        }
        let Some(bus) = &self.event_bus else {
            return;
        };
        let metrics = bus.get_metrics().await;

        println!();
        println!("{}", "=".repeat(80).bright_blue());
        println!("{}", "Session Summary".bright_white().bold());
        println!("{}", "=".repeat(80).bright_blue());
        for line in summary_lines(&metrics, self.start_time.elapsed(), assistant.message_count().await) {
            println!("{}", line);
        }
        println!();
    }
}

fn spinner_message(event: &Event) -> Option<String> {
    match event {
        Event::BackendRequest { method, path } => Some(format!("🔌 {} {}", method, path.bright_cyan())),
        Event::APICallStarted { provider, model } => {
            Some(format!("🤖 Asking {} ({})", provider.bright_cyan(), model))
        }
        Event::BackendFailed { path, .. } => Some(format!("❌ {} failed", path)),
        _ => None,
    }
}

fn summary_lines(metrics: &Metrics, elapsed: Duration, messages: usize) -> Vec<String> {
    vec![
        format!("⏱️  Duration: {}:{:02}", elapsed.as_secs() / 60, elapsed.as_secs() % 60),
        format!("💬 Turns: {} ({} messages)", metrics.turns, messages),
        format!(
            "🔌 Backend Calls: {} ({} failed)",
            metrics.backend_calls.to_string().bright_cyan(),
            metrics.backend_failures.to_string().bright_red()
        ),
        format!(
            "🤖 Model Calls: {} ({} failed)",
            metrics.api_calls.to_string().bright_cyan(),
            metrics.api_failures.to_string().bright_red()
        ),
    ]
}
