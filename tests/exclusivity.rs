use color_eyre::Result;
use common::{expect_closed, start_default_gateway, PATIENCE};
use pretty_assertions::assert_eq;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

mod common;

async fn exchange(
    client: &mut TcpStream,
    wire: &mut tokio::io::DuplexStream,
    msg: &[u8],
) -> Result<()> {
    client.write_all(msg).await?;
    let mut buf = vec![0; msg.len()];
    timeout(PATIENCE, wire.read_exact(&mut buf)).await??;
    assert_eq!(buf, msg);

    wire.write_all(msg).await?;
    timeout(PATIENCE, client.read_exact(&mut buf)).await??;
    assert_eq!(buf, msg);

    Ok(())
}

#[tokio::test]
async fn second_client_is_turned_away() -> Result<()> {
    let mut gateway = start_default_gateway("second_client_is_turned_away").await?;

    let mut first = gateway.connect().await?;
    let mut first_wire = gateway.wire().await?;

    // Once bytes flow the first session holds the lock.
    exchange(&mut first, &mut first_wire, b"first").await?;
    assert!(gateway.pairing.lock().is_locked());

    let mut second = gateway.connect().await?;

    // A device was opened for the second client, and closed again unused.
    let mut second_wire = gateway.wire().await?;
    expect_closed(&mut second).await?;
    expect_closed(&mut second_wire).await?;

    // The first session did not notice.
    assert!(gateway.pairing.lock().is_locked());
    exchange(&mut first, &mut first_wire, b"still here").await?;

    Ok(())
}

#[tokio::test]
async fn next_client_is_served_once_first_leaves() -> Result<()> {
    let mut gateway = start_default_gateway("next_client_is_served").await?;

    let mut first = gateway.connect().await?;
    let mut first_wire = gateway.wire().await?;
    exchange(&mut first, &mut first_wire, b"first").await?;

    drop(first);
    expect_closed(&mut first_wire).await?;
    gateway.wait_unlocked().await?;

    let mut next = gateway.connect().await?;
    let mut next_wire = gateway.wire().await?;
    exchange(&mut next, &mut next_wire, b"next").await?;
    assert!(gateway.pairing.lock().is_locked());

    Ok(())
}

#[tokio::test]
async fn turned_away_clients_never_queue() -> Result<()> {
    let mut gateway = start_default_gateway("turned_away_clients_never_queue").await?;

    let mut first = gateway.connect().await?;
    let mut first_wire = gateway.wire().await?;
    exchange(&mut first, &mut first_wire, b"first").await?;

    for _ in 0..3 {
        let mut other = gateway.connect().await?;
        expect_closed(&mut other).await?;
    }

    drop(first);
    gateway.wait_unlocked().await?;

    // Nobody was waiting to take over.
    assert!(!gateway.pairing.lock().is_locked());

    Ok(())
}
