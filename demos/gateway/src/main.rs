//! Relay gateway demo.
//!
//! Runs a UDP echo server standing in for the game server, a gateway
//! listener hosting it over the in-process loopback relay, and a handful of
//! relay clients that send packets and wait for their echoes.
//!
//! Environment variables:
//! - RELAY_BRIDGE_SERVER: game server address (default 127.0.0.1:32001)
//! - RELAY_BRIDGE_CLIENTS: number of joining clients
//! - RELAY_BRIDGE_TICK_RATE_HZ: listener tick rate
//! - RELAY_BRIDGE_LOG_LEVEL: debug|info|warn|error (RUST_LOG takes precedence)

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;

use relay_bridge::client::{ClientConfigBuilder, RelayTransportFactory};
use relay_bridge::core::{DEFAULT_DATAGRAM_MTU, DEFAULT_SERVER_ENDPOINT, PeerId};
use relay_bridge::prelude::{
    ClientBridgeTransport, LoopbackNetwork, RelayListener, ServerConfigBuilder, TickDriver,
    Transport, TransportEvent, TransportFactory, TransportState,
};
use relay_bridge::transport::{LoopbackClient, UdpLinkFactory};

#[derive(Debug, Parser)]
#[command(name = "relay-gateway")]
#[command(about = "Host a local UDP server over the loopback relay and echo client traffic")]
struct Args {
    /// Game server address to bind the echo server on.
    #[arg(long, env = "RELAY_BRIDGE_SERVER", default_value_t = DEFAULT_SERVER_ENDPOINT)]
    server: SocketAddr,

    /// Number of joining clients.
    #[arg(long, env = "RELAY_BRIDGE_CLIENTS", default_value_t = 3)]
    clients: u32,

    /// Packets each client sends.
    #[arg(long, default_value_t = 10)]
    packets: u32,

    /// Listener tick rate.
    #[arg(long, env = "RELAY_BRIDGE_TICK_RATE_HZ", default_value_t = 30)]
    tick_rate_hz: u32,

    /// Maximum frame size on the datagram link.
    #[arg(long, default_value_t = DEFAULT_DATAGRAM_MTU)]
    mtu: usize,

    /// Inbound frames held per session.
    #[arg(long, default_value_t = 1024)]
    queue_capacity: usize,

    /// Close sessions after this many consecutive relay send failures.
    #[arg(long)]
    max_send_failures: Option<u32>,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Log level when RUST_LOG is unset.
    #[arg(long, env = "RELAY_BRIDGE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// One joining peer and its progress.
struct DemoClient {
    index: u32,
    transport: ClientBridgeTransport<LoopbackClient>,
    sent: u32,
    echoed: u32,
    failed: bool,
    buffer: Vec<Vec<u8>>,
}

impl DemoClient {
    fn step(&mut self, packets: u32) {
        self.buffer.clear();
        self.echoed += self.transport.receive(&mut self.buffer) as u32;
        for payload in &self.buffer {
            debug!(client = self.index, echo = %String::from_utf8_lossy(payload), "echo received");
        }

        while let Some(event) = self.transport.poll_event() {
            match event {
                TransportEvent::Opened => debug!(client = self.index, "transport opened"),
                TransportEvent::Error(e) => {
                    warn!(client = self.index, error = %e, "transport error");
                    self.failed = true;
                }
            }
        }

        if self.transport.state() == TransportState::Open && self.sent < packets {
            let payload = format!("client {} packet {}", self.index, self.sent);
            match self.transport.send(payload.as_bytes()) {
                Ok(()) => self.sent += 1,
                Err(e) => {
                    warn!(client = self.index, error = %e, "send failed");
                    self.failed = true;
                }
            }
        }
    }

    fn done(&self, packets: u32) -> bool {
        self.failed || self.echoed >= packets
    }

    fn disconnect(&mut self) {
        self.transport.prepare_disconnect();
        if let Err(e) = self.transport.send(b"bye") {
            debug!(client = self.index, error = %e, "final notice not sent");
        }
        self.transport.close();
    }
}

fn init_tracing(level: &str) {
    let default_directive = format!("relay_bridge={level},relay_gateway={level},warn");
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

async fn spawn_echo_server(addr: SocketAddr) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let socket = UdpSocket::bind(addr)
        .await
        .with_context(|| format!("binding game server on {addr}"))?;
    let local = socket.local_addr()?;

    let handle = tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, from)) => {
                    if let Err(e) = socket.send_to(&buf[..len], from).await {
                        warn!(error = %e, %from, "echo failed");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "game server receive failed");
                    break;
                }
            }
        }
    });

    Ok((local, handle))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let (server_addr, echo) = spawn_echo_server(args.server).await?;
    info!(%server_addr, "game server listening");

    let config = ServerConfigBuilder::new()
        .server_endpoint(server_addr)
        .max_frame_size(args.mtu)
        .inbound_queue_capacity(args.queue_capacity)
        .max_consecutive_send_failures(args.max_send_failures)
        .tick_rate_hz(args.tick_rate_hz)
        .build()
        .context("invalid bridge configuration")?;

    let network = LoopbackNetwork::new();
    let host = PeerId::new(1);
    let mut listener = RelayListener::gateway(network.listen(host), UdpLinkFactory::new(), &config)
        .context("starting relay listener")?;
    info!(host = %host.label(), clients = args.clients, "gateway hosting");

    let client_config = ClientConfigBuilder::new()
        .host(host)
        .max_frame_size(args.mtu)
        .build()
        .context("invalid client configuration")?;

    let mut clients = Vec::new();
    for index in 0..args.clients {
        let factory = RelayTransportFactory::new(
            network.client(PeerId::new(u64::from(index) + 100)),
            client_config.clone(),
        );
        let mut transport = factory.create();
        transport
            .open(server_addr, &client_config.settings)
            .with_context(|| format!("opening client {index}"))?;
        clients.push(DemoClient {
            index,
            transport,
            sent: 0,
            echoed: 0,
            failed: false,
            buffer: Vec::new(),
        });
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    let packets = args.packets;
    let driver = TickDriver::from_config(&config);
    let run = driver.run(&mut listener, shutdown_rx, |listener, _| {
        while let Some(event) = listener.poll_event() {
            info!(?event, "listener event");
        }
        for client in &mut clients {
            client.step(packets);
        }
        if clients.iter().all(|c| c.done(packets)) {
            for client in &mut clients {
                client.disconnect();
            }
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    let ticks = tokio::time::timeout(Duration::from_secs(args.timeout_secs), run)
        .await
        .context("timed out waiting for echoes")??;

    let mut failures = 0;
    for client in &clients {
        info!(
            client = client.index,
            sent = client.sent,
            echoed = client.echoed,
            stats = ?client.transport.stats(),
            "client finished"
        );
        if client.failed || client.echoed < packets {
            failures += 1;
        }
    }

    echo.abort();
    info!(ticks, "gateway demo finished");

    if failures > 0 {
        bail!("{failures} client(s) did not receive every echo");
    }
    Ok(())
}
