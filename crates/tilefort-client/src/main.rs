//! Headless Tile Fortress client.
//!
//! Connects to a server, keeps every chunk within the draw distance of the
//! origin loaded, optionally paints one tile, and logs what arrives.
//!
//! Run with: `cargo run -p tilefort-client -- --server 127.0.0.1 --paint 3,4,2`

mod link;
mod paint;
mod setup;

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tilefort_app::{PlatformDirs, Ticker};
use tilefort_config::{CliArgs, Config, Role};
use tilefort_net::TcpTransport;
use tilefort_sync::ClientSession;
use tilefort_world::ChunkPosition;
use tracing::{error, info};

use crate::link::{LinkState, LinkWatch};
use crate::paint::Paint;

#[derive(Parser, Debug)]
#[command(name = "tilefort-client", about = "Headless Tile Fortress client")]
struct ClientArgs {
    #[command(flatten)]
    cli: CliArgs,

    /// Place one tile once its chunk is loaded, as `x,y,id`.
    #[arg(long, allow_hyphen_values = true)]
    paint: Option<Paint>,

    /// Quit after this many ticks.
    #[arg(long)]
    ticks: Option<u64>,
}

fn main() -> ExitCode {
    let args = ClientArgs::parse();

    let dirs = match &args.cli.config {
        Some(dir) => PlatformDirs::with_config_dir(dir.clone()),
        None => match PlatformDirs::resolve(Role::Client) {
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
    config.apply_cli_overrides(&args.cli, Role::Client);

    tilefort_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));

    let addr = match setup::server_addr(&config) {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid server address: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut session = ClientSession::new(
        TcpTransport::connect(addr, setup::tcp_config(&config)),
        setup::client_settings(&config),
    );
    if let Err(e) = session.open() {
        error!("Failed to start client: {e}");
        return ExitCode::FAILURE;
    }
    info!("Connecting to {addr}");

    let draw_distance = config.client.draw_distance;
    let area = ((2 * draw_distance + 1) * (2 * draw_distance + 1)) as usize;
    let mut pending_paint = args.paint;
    let connect_timeout = config.network.timeout();
    let mut link = LinkWatch::new(Instant::now(), connect_timeout);
    let mut gave_up = false;
    let mut area_loaded = false;
    let mut ticks = 0u64;

    let mut ticker = Ticker::with_rate(config.tick.client_rate, config.tick.max_elapsed());
    let stop = ticker.stop_handle();
    ticker.run(|_| {
        let tick = session.update();
        ticks += 1;

        match link.observe(session.is_connected(), Instant::now()) {
            LinkState::Connected => {
                let missing = session.request_area(ChunkPosition::new(0, 0), draw_distance);
                if missing == 0 && !area_loaded {
                    info!("All {area} chunks within distance {draw_distance} loaded");
                    area_loaded = true;
                }
            }
            LinkState::Connecting => {}
            LinkState::Lost => {
                info!("Lost connection to the server");
                stop.stop();
            }
            LinkState::TimedOut => {
                error!("No connection to {addr} after {connect_timeout:?}");
                gave_up = true;
                stop.stop();
            }
        }

        if let Some(brush) = pending_paint
            && session.paint(brush.position, brush.tile)
        {
            info!("Painted {} at {}", brush.tile, brush.position);
            pending_paint = None;
        }

        if tick.world.applied > 0 {
            info!("Applied {} build orders", tick.world.applied);
        }
        if tick.orders_sent > 0 {
            info!("Sent {} build orders", tick.orders_sent);
        }
        if args.ticks.is_some_and(|limit| ticks >= limit) {
            stop.stop();
        }
    });

    session.close("Client exiting");
    info!("Client stopped after {ticks} ticks");
    if gave_up {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
