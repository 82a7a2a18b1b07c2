#![allow(dead_code)]

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use color_eyre::{eyre::eyre, Result};
use serial_proxy::{
    config::PairingConfig,
    mock::{MockBuilder, MockWires},
    registry::{Pairing, Registry},
    serial::SerialSettings,
    server,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, DuplexStream},
    net::TcpStream,
    time::{sleep, timeout, Instant},
};
use tracing::{info, Level};

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// How long tests wait for something which should happen promptly.
pub const PATIENCE: Duration = Duration::from_secs(5);

pub struct Gateway {
    pub addr: SocketAddr,
    pub pairing: Arc<Pairing<MockBuilder>>,
    pub mock: MockBuilder,
    pub wires: MockWires,
}

impl Gateway {
    pub async fn connect(&self) -> Result<TcpStream> {
        info!("Connecting to {}", self.addr);
        Ok(TcpStream::connect(self.addr).await?)
    }

    /// The wire end of the device opened for the most recent client.
    pub async fn wire(&mut self) -> Result<DuplexStream> {
        self.wires
            .next_within(PATIENCE)
            .await
            .ok_or_else(|| eyre!("No device was opened"))
    }

    pub async fn wait_unlocked(&self) -> Result<()> {
        wait_until(|| !self.pairing.lock().is_locked()).await
    }
}

pub fn pairing_config(comm_port: u32, idle_timeout: Duration) -> PairingConfig {
    PairingConfig {
        comm_port,
        net_port: 0,
        device: format!("mock{comm_port}"),
        serial: SerialSettings::default(),
        timeout: idle_timeout,
    }
}

/// Start a gateway with one pairing per given mock, all listening on ephemeral ports.
pub async fn start_gateways(
    mocks: Vec<((MockBuilder, MockWires), Duration)>,
) -> Result<Vec<Gateway>> {
    serial_proxy::logging::init(Level::DEBUG, None).await;

    let mut pairings = vec![];
    let mut handles = vec![];

    for (comm_port, ((mock, wires), idle_timeout)) in (1..).zip(mocks) {
        pairings.push((pairing_config(comm_port, idle_timeout), mock.clone()));
        handles.push((mock, wires));
    }

    let registry = Registry::bind(LOCALHOST, pairings).await?;

    let gateways = registry
        .local_addrs()?
        .into_iter()
        .zip(registry.pairings().cloned())
        .zip(handles)
        .map(|((addr, pairing), (mock, wires))| Gateway {
            addr,
            pairing,
            mock,
            wires,
        })
        .collect();

    server::spawn(registry);

    Ok(gateways)
}

pub async fn start_gateway(
    mock: (MockBuilder, MockWires),
    idle_timeout: Duration,
) -> Result<Gateway> {
    let mut gateways = start_gateways(vec![(mock, idle_timeout)]).await?;

    Ok(gateways.remove(0))
}

pub async fn start_default_gateway(name: &str) -> Result<Gateway> {
    start_gateway(MockBuilder::new(name), Duration::from_secs(30)).await
}

pub async fn wait_until<F: Fn() -> bool>(condition: F) -> Result<()> {
    let give_up = Instant::now() + PATIENCE;

    while !condition() {
        if Instant::now() > give_up {
            return Err(eyre!("Condition not met in time"));
        }
        sleep(Duration::from_millis(10)).await;
    }

    Ok(())
}

/// Succeeds if the other side closes, whether gracefully or by reset.
pub async fn expect_closed<R: AsyncRead + Unpin>(reader: &mut R) -> Result<()> {
    let mut buf = [0; 64];

    match timeout(PATIENCE, reader.read(&mut buf)).await? {
        Ok(0) | Err(_) => Ok(()),
        Ok(n) => Err(eyre!("Expected close, got {n} bytes")),
    }
}
