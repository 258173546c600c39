use clap::Parser;
use client::BoardClient;
use log::error;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address (host:port)
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Room id or slug to join
    #[clap(short, long)]
    room: String,
    /// Client identifier announced to the room
    #[clap(short, long, default_value = "cli")]
    client_id: String,
}

/// Interactive room console: prints every event the room broadcasts and
/// forwards stdin lines. A line that parses as JSON is sent as-is;
/// anything else is wrapped as a chat event.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();
    let args = Args::parse();

    let mut board = BoardClient::connect(&args.server, &args.room, &args.client_id).await?;
    let snapshot = board.await_snapshot().await?;
    println!(
        "Joined room {} as {} (version {}, match {:?})",
        args.room, args.client_id, snapshot.version, snapshot.match_status
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = board.next_event() => {
                match event {
                    Ok(Some(value)) => println!("<- {}", value),
                    Ok(None) => {
                        println!("Server closed the connection");
                        break;
                    }
                    Err(e) => {
                        error!("Receive failed: {}", e);
                        break;
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let event = match serde_json::from_str::<Value>(&line) {
                    Ok(value) => value,
                    Err(_) => json!({
                        "type": "chat",
                        "client_id": args.client_id,
                        "text": line,
                    }),
                };
                if let Err(e) = board.send_event(&event).await {
                    error!("Send failed: {}", e);
                    break;
                }
            }
        }
    }

    Ok(())
}
