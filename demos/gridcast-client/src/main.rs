use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gridcast::prelude::*;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(author, version, about = "Line-oriented Gridcast client", long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Move in a random direction every this many milliseconds
    #[arg(short, long)]
    wander: Option<u64>,
}

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Move(Direction),
    Say(String),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if let Some(text) = line.strip_prefix("say ") {
        return Some(Command::Say(text.to_string()));
    }
    let command = match line {
        "w" => Command::Move(Direction::Up),
        "s" => Command::Move(Direction::Down),
        "a" => Command::Move(Direction::Left),
        "d" => Command::Move(Direction::Right),
        "quit" | "q" => Command::Quit,
        _ => return None,
    };
    Some(command)
}

fn describe(view: &ClientView) -> String {
    let mut out = String::new();
    match (view.self_id, view.own_position()) {
        (Some(id), Some(position)) => {
            let _ = writeln!(out, "you are {id} at {position}");
        }
        (Some(id), None) => {
            let _ = writeln!(out, "you are {id}");
        }
        _ => out.push_str("waiting for the server...\n"),
    }
    for (id, position) in &view.participants {
        let _ = writeln!(out, "  {id} {position}");
    }
    for entry in &view.chat_log {
        let _ = writeln!(out, "[{}] {}", entry.participant, entry.text);
    }
    out
}

fn random_direction() -> Direction {
    let index = rand::rng().random_range(0..Direction::ALL.len());
    Direction::ALL[index]
}

async fn print_views(mut views: watch::Receiver<ClientView>) {
    while views.changed().await.is_ok() {
        let text = describe(&views.borrow_and_update());
        println!("{text}");
    }
}

async fn wander(client: Arc<GridcastClient>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        if let Err(e) = client.send_movement(random_direction()).await {
            tracing::debug!(error = %e, "wander stopped");
            return;
        }
    }
}

/// Runs one command. Returns `false` when the user asked to quit.
async fn execute(
    client: &GridcastClient,
    command: Command,
) -> Result<bool, GridcastError> {
    match command {
        Command::Move(direction) => {
            client.send_movement(direction).await?;
        }
        Command::Say(text) => {
            client.send_chat(&text).await?;
        }
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let client = Arc::new(GridcastClient::connect(&args.host, args.port).await?);
    eprintln!("connected to {}:{}; w/a/s/d to move, say <text>, quit", args.host, args.port);

    let printer = tokio::spawn(print_views(client.subscribe()));
    let wanderer = args
        .wander
        .map(|ms| tokio::spawn(wander(Arc::clone(&client), Duration::from_millis(ms.max(1)))));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut local_error = None;
    loop {
        let line = tokio::select! {
            _ = client.disconnected() => break,
            line = lines.next_line() => line,
        };
        let Ok(Some(line)) = line else { break };

        let Some(command) = parse_command(&line) else {
            eprintln!("unknown command: {}", line.trim());
            continue;
        };
        match execute(&client, command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                local_error = Some(e.to_string());
                break;
            }
        }
    }

    if let Some(wanderer) = wanderer {
        wanderer.abort();
    }
    let _ = client.close().await;
    printer.abort();

    if let Some(error) = client.view().last_error.or(local_error) {
        eprintln!("session ended: {error}");
    }
    Ok(())
}
