mod config;
mod console;

use std::sync::Arc;

use busvoice_audio::{CommandSink, LogSink};
use busvoice_core::{
    DispatchEvent, FileSettingsStore, Language, LifecycleController, SpeechSink,
};
use config::AnnouncerConfig;
use console::ConsoleCommand;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "info,busvoice_core=info,busvoice_audio=info,announcer=info".to_string()
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(target: "announcer", "Starting announcer demo: stdin → dispatcher → TTS");

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = AnnouncerConfig::load();

    let sink: Arc<dyn SpeechSink> = if cfg.log_only {
        Arc::new(LogSink::default())
    } else {
        let engine = CommandSink::new(Some(cfg.tts.clone()));
        if engine.is_available() {
            Arc::new(engine)
        } else {
            warn!(target: "announcer", "No TTS engine; announcements will only be logged");
            Arc::new(LogSink::default())
        }
    };
    let store = Arc::new(FileSettingsStore::new(&cfg.settings_path));
    let controller = LifecycleController::start(sink, store, cfg.assistant.clone())?;

    // Mirror dispatcher events into the log
    let mut events = controller.subscribe();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ev) => log_event(&ev),
                Err(RecvError::Lagged(n)) => {
                    warn!(target: "announcer", skipped = n, "Event log lagging")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{}", console::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => {
                info!(target: "announcer", "Shutting down...");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let command = match console::parse(&line) {
            Ok(c) => c,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            break;
        }
        if let Err(e) = run(&controller, &cfg, command).await {
            error!(target: "announcer", error = %e, "Command failed");
        }
    }

    controller.shutdown().await?;
    event_task.abort();
    Ok(())
}

async fn run(
    controller: &LifecycleController,
    cfg: &AnnouncerConfig,
    command: ConsoleCommand,
) -> busvoice_core::Result<()> {
    match command {
        ConsoleCommand::Say {
            priority,
            language,
            text,
        } => {
            let language = language.unwrap_or_else(|| controller.current_language());
            match controller.enqueue(text, priority, language).await? {
                Some(id) => println!("queued {}", id),
                None => println!("assistant is off; enable it first"),
            }
        }
        ConsoleCommand::Enable => controller.enable().await?,
        ConsoleCommand::Disable => controller.disable().await?,
        ConsoleCommand::Stop => controller.stop().await?,
        ConsoleCommand::Language(tag) => controller.set_language_tag(&tag).await?,
        ConsoleCommand::Volume(v) => {
            controller.set_volume(v);
            println!("volume {:.2}", controller.volume());
        }
        ConsoleCommand::Status => {
            let snap = controller.snapshot();
            let language: Language = controller.current_language();
            println!(
                "enabled={} synthesis={} state={:?} language={} ({}) volume={:.2} queued={} now=\"{}\"",
                controller.is_enabled(),
                controller.synthesis_available(),
                snap.state,
                language,
                language.native_name(),
                controller.volume(),
                snap.queued,
                controller.current_announcement_text(),
            );
        }
        ConsoleCommand::Languages => {
            for lang in &cfg.assistant.languages {
                println!("{}  {} ({})", lang.tag(), lang.name(), lang.native_name());
            }
        }
        ConsoleCommand::Help => println!("{}", console::HELP),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

fn log_event(ev: &DispatchEvent) {
    match ev {
        DispatchEvent::Started {
            id,
            text,
            language,
            voice,
            tier,
        } => info!(
            target: "announcer",
            %id,
            %language,
            voice = voice.as_deref().unwrap_or("<engine default>"),
            tier = ?tier,
            "🗣️  {}",
            text
        ),
        DispatchEvent::Failed { id, reason } => {
            warn!(target: "announcer", %id, %reason, "Announcement failed")
        }
        DispatchEvent::Rejected { reason } => {
            warn!(target: "announcer", %reason, "Announcement rejected")
        }
        other => tracing::debug!(target: "announcer", event = ?other, "Dispatch event"),
    }
}
