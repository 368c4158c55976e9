//! Interactive play loop.
//!
//! A line-oriented protocol on stdin:
//! - Lines starting with `#` are commands (quit, world, character, help)
//! - `quit`, `exit` and `end session` close the session
//! - Everything else is sent to the DM as player input

use anyhow::Result;
use dm_core::{DmError, DungeonMaster};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

fn print_text(text: &str) {
    print!("{text}");
    io::stdout().flush().ok();
}

fn print_help() {
    println!("Commands:");
    println!("  #quit             - End the session and exit");
    println!("  #world            - Show the current world state");
    println!("  #character <name> - Show a character sheet");
    println!("  #help             - Show this help");
    println!("  (anything else is sent as player action)");
}

/// Run sessions until the player quits or stdin closes.
pub async fn run(mut dm: DungeonMaster) -> Result<()> {
    println!("=== Campaign Dungeon Master ===");
    print_help();
    println!();

    println!("[DM]");
    dm.start_session(print_text).await?;
    println!();
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            close(&mut dm).await;
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            let mut parts = command.splitn(2, char::is_whitespace);
            match parts.next() {
                Some("quit") | Some("exit") => {
                    close(&mut dm).await;
                    break;
                }
                Some("world") => {
                    let world = dm.world();
                    let mut world = world.lock().await;
                    match world.get_current_context_summary().await {
                        Ok(summary) => println!("[WORLD]\n{summary}"),
                        Err(e) => println!("[ERROR] {e}"),
                    }
                }
                Some("character") => match parts.next().map(str::trim).filter(|n| !n.is_empty()) {
                    Some(name) => match dm.characters().get_character_info(name).await {
                        Ok(info) => println!("{info}"),
                        Err(e) => println!("[ERROR] {e}"),
                    },
                    None => println!("[ERROR] Usage: #character <name>"),
                },
                Some("help") => print_help(),
                _ => println!("[ERROR] Unknown command. Type #help for help."),
            }
            continue;
        }

        if matches!(line.to_lowercase().as_str(), "quit" | "exit" | "end session") {
            close(&mut dm).await;
            break;
        }

        println!("[DM]");
        match dm.process_input(line, print_text).await {
            Ok(response) => {
                println!();
                for result in response.tool_results.iter().filter(|r| r.is_error) {
                    println!("[TOOL ERROR] {}", result.content);
                }
                println!();
                if response.session_ended {
                    println!("The session has ended. Farewell.");
                    break;
                }
            }
            Err(DmError::EmptyInput) => {}
            Err(e) => {
                println!();
                println!("[ERROR] {e}");
            }
        }
    }

    Ok(())
}

async fn close(dm: &mut DungeonMaster) {
    if dm.session_id().is_none() {
        return;
    }
    match dm.end_session().await {
        Ok(message) => println!("{message}"),
        Err(e) => warn!(error = %e, "failed to end session"),
    }
}
