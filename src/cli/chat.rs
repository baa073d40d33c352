use std::io::{self, Write};

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::ai::PersonalityRegistry;
use crate::ai::chat::{ChatSession, TurnEvent};
use crate::core::{AppConfig, logging};
use crate::openai::OpenAiClient;

#[derive(Debug, PartialEq)]
enum Input<'a> {
    Empty,
    Quit,
    Reset,
    ListPersonalities,
    SelectPersonality(&'a str),
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line.split_once(' ') {
        _ if line.is_empty() => Input::Empty,
        Some(("/personality", id)) => Input::SelectPersonality(id.trim()),
        None if line == "/quit" || line == "/exit" => Input::Quit,
        None if line == "/reset" => Input::Reset,
        None if line == "/personalities" => Input::ListPersonalities,
        _ => Input::Message(line),
    }
}

/// Prints a turn as it streams. Fragments go straight to stdout since
/// a terminal can't redraw the partial reply in place.
fn print_event(event: TurnEvent) {
    match event {
        TurnEvent::Partial { fragment, .. } => {
            print!("{}", fragment);
            let _ = io::stdout().flush();
        }
        TurnEvent::Complete { .. } => println!(),
        TurnEvent::Failed { error, content } => {
            println!();
            eprintln!("Error occurred: {}", error);
            println!("{}", content);
        }
    }
}

fn print_personalities(registry: &PersonalityRegistry, selected: &str) {
    for p in registry.list() {
        let marker = if p.id == selected { "*" } else { " " };
        println!("{} {:<13} {} {}", marker, p.id, p.icon, p.description);
    }
}

pub async fn run(config: AppConfig, personality: &str) -> Result<()> {
    logging::init("warn");

    let registry = PersonalityRegistry::new()?;
    let invoker = OpenAiClient::new(&config);
    let mut session = ChatSession::new(personality);
    // Fail fast on a bad --personality
    session.select_personality(&registry, personality)?;

    let mut rl = DefaultEditor::new()?;
    println!("Study Buddy ({}). Type /personalities, /personality <name>, /reset or /quit.", config.openai_model);

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Quit => break,
                    Input::Reset => {
                        session.reset();
                        println!("Chat history cleared.");
                    }
                    Input::ListPersonalities => {
                        print_personalities(&registry, session.personality_id())
                    }
                    Input::SelectPersonality(id) => {
                        match session.select_personality(&registry, id) {
                            Ok(()) => println!("Personality is now {}", id),
                            Err(e) => println!("Error: {}", e),
                        }
                    }
                    Input::Message(msg) => {
                        session.run_turn(&registry, &invoker, msg, print_event).await?;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
