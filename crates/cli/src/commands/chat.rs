//! `feedloom chat`: interactive or single-message chat.
//!
//! Replies are streamed, so tool calls and their retries show up as they run.

use std::io::Write;

use feedloom_chat::{ChatRequest, ChatService, StreamEvent};
use feedloom_core::message::SessionId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub async fn run(message: Option<String>, model_type: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let state = super::load_state().await?;
    let session_id = SessionId::new();

    if let Some(msg) = message {
        // Single message mode
        turn(&state.chat, &session_id, &msg, model_type.as_deref()).await?;
        println!();
        return Ok(());
    }

    println!();
    println!("  📰 feedloom chat");
    println!();
    println!("  Model:     {}", model_type.as_deref().unwrap_or(&state.config.default_model_type));
    println!("  Session:   {session_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        print!("  Assistant > ");
        if let Err(e) = turn(&state.chat, &session_id, line, model_type.as_deref()).await {
            eprintln!("  [Error] {e}");
        }
        println!();
        println!();
    }

    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

/// Run one streaming turn and print it as it arrives.
async fn turn(
    chat: &ChatService,
    session_id: &SessionId,
    message: &str,
    model_type: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = ChatRequest::new(message).in_session(session_id.as_str());
    request.model_type = model_type.map(str::to_string);

    let (tx, mut rx) = mpsc::channel::<StreamEvent>(256);
    chat.stream(request, tx).await?;

    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        if !event.chunk.is_empty() {
            write!(stdout, "{}", event.chunk)?;
            stdout.flush()?;
        }
        if event.is_final {
            break;
        }
    }
    Ok(())
}
