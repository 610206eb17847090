//! Regolith entry point: `--server` runs the authoritative world,
//! `--connect <addr>` runs a predicting client.
//!
//! The client here is headless (rendering lives in its own crate and
//! pulls from the simulation's dirty-chunk and player-state views); it
//! drives a scripted input pattern so a world can be exercised end to end
//! from two terminals.

mod game_loop;
mod input;
mod socket;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use regolith_config::{CliArgs, Config};
use regolith_net::{ClientWorld, NetParams, Outbox, ReceiveQueue, ServerWorld};
use regolith_sim::SimParams;

use game_loop::GameLoop;
use input::{InputFrame, InputSampler};
use socket::GameSocket;

fn net_params(config: &Config) -> NetParams {
    NetParams {
        grid_edge: config.sim.grid_edge_chunks,
        voxel_size: config.sim.voxel_size,
        snapshot_rate: config.network.snapshot_rate,
        command_ring_capacity: config.network.command_ring_capacity,
        sim: SimParams {
            mouse_sensitivity: config.input.mouse_sensitivity,
            surface_level: config.sim.surface_level,
            terraform_range: config.sim.terraform_range,
            terraform_radius: config.sim.terraform_radius,
            terraform_rate: config.sim.terraform_rate,
            ..SimParams::default()
        },
    }
}

fn main() {
    let args = CliArgs::parse();
    let config_dir = args.config.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut config = Config::load_or_create(&config_dir).unwrap_or_default();
    config.apply_cli_overrides(&args);

    regolith_log::init_logging(Some(&config));

    if args.server {
        run_server(&config);
    } else {
        run_client(&config, &args.name);
    }
}

fn run_server(config: &Config) {
    let socket = match GameSocket::bind(config.network.server_port) {
        Ok(socket) => socket,
        Err(error) => {
            error!(%error, port = config.network.server_port, "failed to bind server socket");
            return;
        }
    };
    let queue = ReceiveQueue::shared();
    if let Err(error) = socket.spawn_receiver(queue.clone()) {
        error!(%error, "failed to spawn receiver thread");
        return;
    }

    let mut world = ServerWorld::new(net_params(config));
    let mut game_loop = GameLoop::new(1.0 / config.sim.tick_rate as f64);
    let mut inbox: Vec<(Vec<u8>, SocketAddr)> = Vec::new();
    let mut out = Outbox::new();

    info!(
        tick_rate = config.sim.tick_rate,
        snapshot_rate = config.network.snapshot_rate,
        "server running"
    );
    loop {
        game_loop.tick(|dt| {
            // One lock per tick: copy the arrivals out, release, dispatch.
            inbox.clear();
            if let Ok(mut queue) = queue.lock() {
                queue.drain_into(&mut inbox);
            }
            for (bytes, from) in &inbox {
                world.handle_datagram(bytes, *from, &mut out);
            }

            world.step(dt, &mut out);
        });
        socket.send_outbox(&mut out);
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn run_client(config: &Config, name: &str) {
    let server_addr: SocketAddr = match format!(
        "{}:{}",
        config.network.server_address, config.network.server_port
    )
    .parse()
    {
        Ok(addr) => addr,
        Err(error) => {
            error!(%error, "invalid server address");
            return;
        }
    };
    let socket = match GameSocket::bind(config.network.client_port) {
        Ok(socket) => socket,
        Err(error) => {
            error!(%error, port = config.network.client_port, "failed to bind client socket");
            return;
        }
    };

    let mut world = ClientWorld::new(name, server_addr, net_params(config));
    let mut sampler = InputSampler::new();
    let mut game_loop = GameLoop::new(1.0 / config.sim.tick_rate as f64);
    let mut inbox: Vec<(Vec<u8>, SocketAddr)> = Vec::new();
    let mut out = Outbox::new();

    world.send_join(&mut out);
    socket.send_outbox(&mut out);
    info!(%server_addr, name, "joining");

    loop {
        game_loop.tick(|dt| {
            inbox.clear();
            socket.poll_into(&mut inbox);
            for (bytes, from) in &inbox {
                world.handle_datagram(bytes, *from, &mut out);
            }

            if world.world_ready() {
                let frame = scripted_frame(world.tick());
                let command = sampler.sample(&frame, dt);
                world.tick_input(command, &mut out);

                if world.tick() % config.sim.tick_rate as u64 == 0 {
                    if let Some(player) = world.local_player() {
                        info!(
                            tick = world.tick(),
                            p = ?player.p,
                            pending = world.pending_commands(),
                            "client state"
                        );
                    }
                }
            }
        });
        socket.send_outbox(&mut out);
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Headless demo input: roll forward, look around slowly, and dig at the
/// terrain every few seconds.
fn scripted_frame(tick: u64) -> InputFrame {
    let second = tick / 50;
    InputFrame {
        forward: true,
        terraform_destroy: second % 5 == 3,
        mouse_dx: if second % 7 == 0 { 2.0 } else { 0.0 },
        ..InputFrame::default()
    }
}
