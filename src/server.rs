use std::{io, sync::Arc, time::Duration};

use futures::{stream::select_all, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_stream::wrappers::TcpListenerStream;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    endpoint::DeviceTemplate,
    registry::{Pairing, Registry},
    session::BridgeSession,
};

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

fn dispatch<T: DeviceTemplate>(pairing: &Arc<Pairing<T>>, socket: TcpStream) {
    let peer = match socket.peer_addr() {
        Ok(peer) => peer.to_string(),
        Err(e) => {
            warn!(%pairing, ?e, "Client vanished before it could be served");
            return;
        }
    };

    let device = match pairing.template().open() {
        Ok(device) => device,
        Err(e) => {
            warn!(%pairing, %peer, %e, "Failed to open device - connection refused");
            return;
        }
    };

    info!(%pairing, %peer, "Connection accepted, launching session");

    let session = BridgeSession::new(
        device,
        socket,
        pairing.lock().clone(),
        pairing.config().timeout,
    );

    let span = info_span!("session", %pairing, %peer, id = %Uuid::new_v4());

    tokio::spawn(
        async move {
            session.run().await;
            info!("Session exiting");
        }
        .instrument(span),
    );
}

/// Accept clients on every pairing's listener, forever.
///
/// Each accepted client gets its own device and its own session task.
/// Sessions are never waited on.
pub async fn run<T: DeviceTemplate>(registry: Registry<T>) {
    let incoming = select_all(registry.entries.into_iter().map(|(pairing, listener)| {
        TcpListenerStream::new(listener).map(move |connection| (pairing.clone(), connection))
    }));

    accept_loop(incoming).await;

    warn!("No listeners left");
}

async fn accept_loop<T, St>(mut incoming: St)
where
    T: DeviceTemplate,
    St: Stream<Item = (Arc<Pairing<T>>, io::Result<TcpStream>)> + Unpin,
{
    while let Some((pairing, connection)) = incoming.next().await {
        match connection {
            Ok(socket) => dispatch(&pairing, socket),
            Err(e) => {
                warn!(%pairing, ?e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Start accepting in a background task.
pub fn spawn<T: DeviceTemplate>(registry: Registry<T>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { run(registry).await }.instrument(info_span!("dispatcher")))
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use futures::stream;
    use tokio::time::Instant;

    use super::*;
    use crate::{config::PairingConfig, mock::MockBuilder, serial::SerialSettings};

    #[tokio::test(start_paused = true)]
    async fn failed_accepts_back_off() {
        let (mock, mut wires) = MockBuilder::new("backoff");
        let config = PairingConfig {
            comm_port: 1,
            net_port: 0,
            device: "backoff".into(),
            serial: SerialSettings::default(),
            timeout: Duration::from_secs(5),
        };
        let registry = Registry::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), [(config, mock)])
            .await
            .unwrap();
        let pairing = registry.pairings().next().unwrap().clone();

        let failures = stream::iter((0..3).map(|_| {
            let error = io::Error::new(io::ErrorKind::Other, "too many open files");
            (pairing.clone(), Err::<TcpStream, _>(error))
        }));

        let started = Instant::now();
        accept_loop(failures).await;

        assert!(started.elapsed() >= ACCEPT_BACKOFF * 3);
        assert!(wires.try_next().is_none());
    }
}
