use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use voxlink::{ChatUi, ClientConfig, Event, SessionContext, Speaker, TerminalUi};

#[tokio::main]
async fn main() {
    // Load .env file if present (for development convenience)
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = ClientConfig::from_env();
    if let Some(url) = std::env::args().nth(1) {
        config.server_url = url;
    }

    let ui = Arc::new(TerminalUi);
    let session = match SessionContext::start(config, ui.clone()).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    println!("Connected. Type a message, /mic to toggle the microphone, /quit to exit.");

    let events = session.events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                match line {
                    "" => {}
                    "/mic" => {
                        if events.send(Event::MicToggle).await.is_err() {
                            break;
                        }
                    }
                    "/quit" => break,
                    text => {
                        session.connection().send_text(text);
                        ui.append_message(text, Speaker::User);
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("Failed to read input: {}", e);
                break;
            }
        }
    }

    session.shutdown().await;
}
