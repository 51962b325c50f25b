use std::sync::Arc;

use clap::Parser;
use log::{info, warn};

mod backend;
mod config;
mod dispatcher;
mod error;
mod event_bus;
mod extract;
mod intent;
mod llm_manager;
mod logger;
mod providers;
mod session;
mod transcript;
mod ui;
mod wizard;

use backend::HttpBackend;
use config::{Config, LlmConfig};
use dispatcher::Dispatcher;
use event_bus::EventBus;
use llm_manager::{LLMManager, LLMProvider, LocalProvider, system_prompt};
use providers::openrouter::OpenRouterProvider;
use session::Assistant;

#[derive(Parser)]
#[command(name = "smart_life", about = "Smart Life Manager assistant")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
    /// Write the default configuration to this path and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<String>,
    /// Plain output: no header, colours or spinner
    #[arg(long)]
    headless: bool,
    /// Verbose logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// One command to run instead of the interactive prompt
    #[arg(last = true)]
    command: Vec<String>,
}

fn build_providers(config: &LlmConfig, assistant_name: &str) -> Vec<Box<dyn LLMProvider>> {
    if config.enabled {
        match OpenRouterProvider::from_config(config) {
            Ok(provider) => return vec![Box::new(provider)],
            Err(e) => warn!("Remote model unavailable, using local replies: {:#}", e),
        }
    }
    vec![Box::new(LocalProvider::new(assistant_name))]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    dotenv::dotenv().ok();
    logger::init(args.verbose);

    if let Some(path) = &args.write_config {
        Config::default().save(shellexpand::tilde(path).as_ref())?;
        println!("Wrote default configuration to {}", path);
        return Ok(());
    }

    let mut config = Config::load(&args.config)?;
    config.merge_with_args(args.headless);

    let event_bus = Arc::new(EventBus::new(256));
    let backend = HttpBackend::new(&config.backend)?;
    let dispatcher = Dispatcher::new(Arc::new(backend)).with_event_bus(event_bus.clone());
    let llm = LLMManager::new(
        build_providers(&config.llm, &config.assistant.name),
        system_prompt(&config.assistant.name),
    )
    .with_event_bus(event_bus.clone());
    info!("Backend at {}, fallback via {}", config.backend.base_url, llm.describe());

    let assistant = Assistant::new(&config.assistant, dispatcher, llm).with_event_bus(event_bus.clone());
    let mut ui = ui::TerminalUI::new(&config.ui, args.headless, assistant.name())
        .with_event_bus(event_bus.clone());
    ui.start()?;

    if args.command.is_empty() {
        if let Err(e) = ui.repl(&assistant).await {
            ui.display_error(&format!("{:#}", e));
        }
    } else {
        ui.turn(&assistant, &args.command.join(" ")).await;
    }

    ui.finish(&assistant).await;
    Ok(())
}
