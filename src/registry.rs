use std::{
    fmt::Display,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::{
    config::{Config, PairingConfig},
    endpoint::{DeviceTemplate, ExclusivityLock},
    error::Error,
    serial::serial_port::SerialPortBuilder,
};

/// One serial device paired with one TCP port.
#[derive(Debug)]
pub struct Pairing<T> {
    config: PairingConfig,
    template: T,
    lock: ExclusivityLock,
    port: u16,
}

impl<T: DeviceTemplate> Pairing<T> {
    /// The resolved settings.
    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    /// The device template sessions open their devices from.
    pub fn template(&self) -> &T {
        &self.template
    }

    /// The lock shared by every session of this pairing.
    pub fn lock(&self) -> &ExclusivityLock {
        &self.lock
    }

    /// The TCP port actually listened on.
    /// Differs from the configured one if that was zero.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl<T: DeviceTemplate> Display for Pairing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "comm{} ({}) <-> tcp {}",
            self.config.comm_port,
            self.template.name(),
            self.port
        )
    }
}

/// All configured pairings, each with its listening socket.
///
/// Built once at startup, then handed over to [`crate::server::run`].
#[derive(Debug)]
pub struct Registry<T> {
    pub(crate) entries: Vec<(Arc<Pairing<T>>, TcpListener)>,
}

impl Registry<SerialPortBuilder> {
    /// Resolve the configuration and bind a listener per serial port.
    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let pairings = config.pairings()?.into_iter().map(|pairing| {
            let template = SerialPortBuilder::new(&pairing.device, pairing.serial);
            (pairing, template)
        });

        Self::bind(config.listen_address(), pairings).await
    }
}

impl<T: DeviceTemplate> Registry<T> {
    /// Bind a listener on the given address for each pairing, in order.
    ///
    /// Fails on the first port which cannot be bound.
    pub async fn bind<I>(address: IpAddr, pairings: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (PairingConfig, T)>,
    {
        let mut entries = vec![];

        for (config, template) in pairings {
            let port = config.net_port;
            let listener = TcpListener::bind((address, port))
                .await
                .map_err(|source| Error::Bind { port, source })?;

            let address = listener.local_addr()?;
            let pairing = Pairing {
                config,
                template,
                lock: ExclusivityLock::default(),
                port: address.port(),
            };

            debug!(%pairing, %pairing.lock, settings = %pairing.config.serial, "Pairing ready");
            info!(%pairing, %address, "Listening");

            entries.push((Arc::new(pairing), listener));
        }

        Ok(Self { entries })
    }

    /// The addresses the listeners are bound to, in pairing order.
    pub fn local_addrs(&self) -> Result<Vec<SocketAddr>, Error> {
        self.entries
            .iter()
            .map(|(_, listener)| listener.local_addr().map_err(Error::from))
            .collect()
    }

    /// The pairings, in configured order.
    pub fn pairings(&self) -> impl Iterator<Item = &Arc<Pairing<T>>> {
        self.entries.iter().map(|(pairing, _)| pairing)
    }

    /// How many pairings there are.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no pairings at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
