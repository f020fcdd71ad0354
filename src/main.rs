//! Trigon game server
//!
//! Lobby-and-match server for generalized tic-tac-toe over newline-delimited
//! JSON on TCP.
//!
//! Usage:
//!   cargo run -- serve                     # Run on the default port
//!   cargo run -- serve --port 6000         # Run on a specific port

use std::env;

use tracing::{error, info};
use trigon::{GameServer, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "serve" => {
            run_server(&args).await?;
        }
        "help" | "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!("Trigon - Multiplayer Tic-Tac-Toe Server");
    println!();
    println!("USAGE:");
    println!("    cargo run -- serve [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    serve               Start the game server");
    println!("    help                Show this help message");
    println!();
    println!("OPTIONS:");
    println!("    --bind <ADDR>       Address to listen on (default: 127.0.0.1)");
    println!("    --port <PORT>       Port to listen on (default: 5001)");
    println!("    --max-conn <NUM>    Maximum connections (default: 1000)");
    println!();
    println!("PROTOCOL:");
    println!("    One JSON object per line over a plain TCP socket. Register with");
    println!("    HELLO, then LIST, CREATE or JOIN a game and play with MOVE.");
    println!("    A 2-player game uses a 3x3 board, a 3-player game 4x4; three in");
    println!("    a row wins either way.");
    println!();
    println!("EXAMPLES:");
    println!("    cargo run -- serve");
    println!("    cargo run -- serve --port 6000");
    println!("    RUST_LOG=debug cargo run -- serve");
}

fn parse_bind(args: &[String]) -> String {
    for i in 0..args.len() {
        if args[i] == "--bind" && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "127.0.0.1".to_string()
}

fn parse_port(args: &[String]) -> u16 {
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            if let Ok(port) = args[i + 1].parse() {
                return port;
            }
        }
    }
    5001 // default port
}

fn parse_max_connections(args: &[String]) -> usize {
    for i in 0..args.len() {
        if args[i] == "--max-conn" && i + 1 < args.len() {
            if let Ok(max) = args[i + 1].parse() {
                return max;
            }
        }
    }
    1000 // default
}

async fn run_server(args: &[String]) -> anyhow::Result<()> {
    let config = ServerConfig {
        bind_addr: format!("{}:{}", parse_bind(args), parse_port(args)).parse()?,
        max_connections: parse_max_connections(args),
        ..Default::default()
    };

    info!("Starting Trigon game server...");
    info!("  - Bind address: {}", config.bind_addr);
    info!("  - Max connections: {}", config.max_connections);

    let server = GameServer::bind(config).await?;

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
