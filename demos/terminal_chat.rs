//! Minimal terminal front end for a chat session.
//!
//! Type a message and press enter. `/pull` downloads the configured model,
//! `/clear` resets the conversation, `/stats` prints the counters and
//! `/quit` exits.

use futures::StreamExt;
use kestrel::ai::SnapshotStatus;
use kestrel::logging::init_tracing;
use kestrel::types::BackendState;
use kestrel::{ChatSession, KestrelConfig};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

fn load_dotenv() {
    // A missing .env is fine; the process environment still applies
    let _ = dotenvy::dotenv();
}

async fn download(session: &ChatSession) {
    let mut progress = session.download_model();
    while let Some(event) = progress.next().await {
        match event {
            Ok(event) => match event.fraction {
                Some(fraction) => println!("📥 {} ({:.0}%)", event.message, fraction * 100.0),
                None => println!("📥 {}", event.message),
            },
            Err(err) => {
                println!("❌ Error downloading model: {err}");
                return;
            }
        }
    }
    println!("✅ Model downloaded successfully!");
}

async fn chat_turn(session: &mut ChatSession, text: &str) {
    let mut printed = 0;
    let result = session
        .send(text, |snapshot| {
            // Snapshots repeat the whole reply, print only what is new
            if let Some(fresh) = snapshot.text.get(printed..) {
                print!("{fresh}");
                printed = snapshot.text.len();
            }
            if snapshot.status != SnapshotStatus::Streaming {
                println!();
            }
            let _ = std::io::stdout().flush();
        })
        .await;
    if let Err(err) = result {
        println!("⚠️ {err}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_tracing();

    let config = KestrelConfig::from_env();
    let mut session = ChatSession::connect(&config);

    match session.backend_state().await {
        BackendState::Ready => println!("🧠 {} is ready to chat", session.model()),
        BackendState::ModelMissing => {
            println!("⚠️ {} is not installed, type /pull to download it", session.model())
        }
        BackendState::Unreachable => {
            println!("❌ Cannot reach {}, start it with `ollama serve`", config.base_url)
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/clear" => {
                session.reset();
                println!("Chat cleared!");
            }
            "/pull" => download(&session).await,
            "/stats" => {
                let stats = session.stats();
                println!(
                    "💬 {} messages, 🤖 {} replies",
                    stats.total_messages, stats.assistant_messages
                );
            }
            text => chat_turn(&mut session, text).await,
        }
    }
    Ok(())
}
