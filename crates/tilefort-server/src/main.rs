//! Tile Fortress dedicated server.
//!
//! Runs the authoritative world on a game thread at the configured tick rate
//! and reads console commands on the main thread.
//!
//! Run with: `cargo run -p tilefort-server -- --port 35553`

mod console;
mod setup;

use std::io::BufRead;
use std::process::ExitCode;
use std::thread;
use std::time::Instant;

use clap::Parser;
use tilefort_app::{PlatformDirs, StopHandle, Ticker};
use tilefort_config::{CliArgs, Config, Role};
use tilefort_net::TcpTransport;
use tilefort_sync::ServerSession;
use tracing::{error, info, warn};

use crate::console::Command;

#[derive(Parser, Debug)]
#[command(name = "tilefort-server", about = "Tile Fortress dedicated server")]
struct ServerArgs {
    #[command(flatten)]
    cli: CliArgs,
}

fn main() -> ExitCode {
    let args = ServerArgs::parse();

    let dirs = match &args.cli.config {
        Some(dir) => PlatformDirs::with_config_dir(dir.clone()),
        None => match PlatformDirs::resolve(Role::Server) {
            Ok(dirs) => dirs,
            Err(e) => {
                eprintln!("Failed to resolve platform directories: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let mut config = Config::load_or_create(&dirs.config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args.cli, Role::Server);

    tilefort_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    info!("Tile Fortress server {}", env!("CARGO_PKG_VERSION"));

    let addr = match setup::bind_addr(&config) {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid server address: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut session = ServerSession::new(
        TcpTransport::listen(addr, setup::tcp_config(&config)),
        setup::generator(&config),
        setup::server_settings(&config),
    );
    if let Err(e) = session.open() {
        error!("Failed to start server on {addr}: {e}");
        return ExitCode::FAILURE;
    }

    let mut ticker = Ticker::with_rate(config.tick.server_rate, config.tick.max_elapsed());
    let stop = ticker.stop_handle();
    info!(
        "Ticking at {} Hz, seed {}",
        config.tick.server_rate, config.world.seed
    );

    let game = thread::Builder::new()
        .name("game".to_string())
        .spawn(move || {
            ticker.run(|_| {
                let tick = session.update();
                if tick.chunks_sent > 0 || tick.broadcasts > 0 || !tick.world.dropped.is_empty() {
                    tracing::debug!(?tick, "Server tick");
                }
            });
            session.close("Server shutting down");
        });
    let game = match game {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to spawn game thread: {e}");
            return ExitCode::FAILURE;
        }
    };

    run_console(&stop);

    stop.stop();
    let deadline = Instant::now() + setup::SHUTDOWN_GRACE;
    while !game.is_finished() {
        if Instant::now() >= deadline {
            warn!(
                "Game thread did not stop within {:?}, exiting anyway",
                setup::SHUTDOWN_GRACE
            );
            return ExitCode::FAILURE;
        }
        thread::sleep(std::time::Duration::from_millis(10));
    }
    if game.join().is_err() {
        error!("Game thread panicked");
        return ExitCode::FAILURE;
    }
    info!("Server stopped");
    ExitCode::SUCCESS
}

/// Reads commands until `exit` or the end of input.
fn run_console(stop: &StopHandle) {
    println!("{}", console::help_text());
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        match Command::parse(&line) {
            Command::Exit => return,
            Command::Help => println!("{}", console::help_text()),
            Command::Empty => {}
            Command::Invalid(text) => println!("Invalid command: {text}"),
        }
        if stop.is_stopped() {
            return;
        }
    }
    info!("Console input closed, running until the process is stopped");
    while !stop.is_stopped() {
        thread::sleep(std::time::Duration::from_millis(200));
    }
}
