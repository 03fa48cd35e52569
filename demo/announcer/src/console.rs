//! Line commands typed into the announcer console

use busvoice_core::{Language, Priority};

pub const HELP: &str = "\
commands:
  say [high|medium|low] [lang-tag] <text>   queue an announcement
  enable | disable                          turn the assistant on/off
  stop                                      silence and drop pending announcements
  lang <tag>                                switch language (e.g. hi-IN)
  volume <0.0-1.0>                          set volume
  status                                    show current state
  languages                                 list offered languages
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Say {
        priority: Priority,
        language: Option<Language>,
        text: String,
    },
    Enable,
    Disable,
    Stop,
    Language(String),
    Volume(f32),
    Status,
    Languages,
    Help,
    Quit,
}

pub fn parse(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head.to_ascii_lowercase().as_str() {
        "say" => parse_say(rest),
        "enable" | "on" => Ok(ConsoleCommand::Enable),
        "disable" | "off" => Ok(ConsoleCommand::Disable),
        "stop" => Ok(ConsoleCommand::Stop),
        "lang" | "language" if !rest.is_empty() => Ok(ConsoleCommand::Language(rest.to_string())),
        "lang" | "language" => Err("usage: lang <tag>".into()),
        "volume" | "vol" => rest
            .parse::<f32>()
            .map(ConsoleCommand::Volume)
            .map_err(|_| "usage: volume <0.0-1.0>".to_string()),
        "status" => Ok(ConsoleCommand::Status),
        "languages" => Ok(ConsoleCommand::Languages),
        "help" | "?" | "" => Ok(ConsoleCommand::Help),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => Err(format!("unknown command '{}'; try 'help'", other)),
    }
}

fn parse_say(rest: &str) -> Result<ConsoleCommand, String> {
    let mut remaining = rest;
    let mut priority = Priority::Medium;
    let mut language = None;

    if let Some((word, tail)) = remaining.split_once(char::is_whitespace) {
        if let Ok(p) = word.parse::<Priority>() {
            priority = p;
            remaining = tail.trim_start();
        }
    }
    if let Some((word, tail)) = remaining.split_once(char::is_whitespace) {
        if let Ok(lang) = word.parse::<Language>() {
            language = Some(lang);
            remaining = tail.trim_start();
        }
    }
    if remaining.is_empty() {
        return Err("usage: say [priority] [lang-tag] <text>".into());
    }
    Ok(ConsoleCommand::Say {
        priority,
        language,
        text: remaining.to_string(),
    })
}
