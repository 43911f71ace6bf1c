use std::io::Write;

use anyhow::Result;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use chatrelay_client::{CancelHandle, ChatSession, ClientError, RelayClient, UpdateEvent};

use crate::cli::ChatArgs;
use crate::config::CliConfig;

pub async fn run(args: ChatArgs, config: &CliConfig) -> Result<()> {
    let relay_url = config
        .default
        .relay_url
        .clone()
        .unwrap_or(args.relay_url);
    let mut session = ChatSession::new(RelayClient::new(relay_url));

    if let Some(message) = args.message {
        exchange(&mut session, &message, args.no_stream).await;
        return Ok(());
    }

    println!(
        "{}",
        "ChatRelay - type a message, Ctrl-C to stop a reply, /quit to exit".dimmed()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", "you>".cyan().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }
        exchange(&mut session, line, args.no_stream).await;
    }
    Ok(())
}

/// One request/reply round. Errors are printed, not propagated: a failed
/// exchange should not end the conversation.
async fn exchange(session: &mut ChatSession, message: &str, no_stream: bool) {
    if no_stream {
        match session.send(message).await {
            Ok(entry) => {
                if let Some(entry) = session.transcript().get(entry) {
                    println!("{}", entry.content);
                }
            }
            Err(err) => print_error(&err),
        }
        return;
    }

    // Each update carries the full reply so far; print only the suffix
    // that is new since the last one.
    let mut printed = 0usize;
    let on_event = move |event: UpdateEvent| match event {
        UpdateEvent::Update { content, .. } => {
            print!("{}", &content[printed..]);
            let _ = std::io::stdout().flush();
            printed = content.len();
        }
        UpdateEvent::Completed { .. } => println!(),
        UpdateEvent::Cancelled { .. } => {
            println!();
            println!("{}", "[stopped]".yellow());
        }
        UpdateEvent::Failed { .. } => println!(),
    };

    let (handle, token) = CancelHandle::new();
    let send = session.send_streaming(message, token, on_event);
    tokio::pin!(send);

    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            _ = tokio::signal::ctrl_c() => handle.cancel(),
        }
    };
    if let Err(err) = result {
        print_error(&err);
    }
}

fn print_error(err: &ClientError) {
    eprintln!("{} {}", "error:".red().bold(), err);
}
