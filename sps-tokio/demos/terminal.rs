//! Terminal demo: both ends of an SPS link in one process, with the credit
//! protocol visible in the logs.
//!
//! Run with `RUST_LOG=trace` to watch every grant and frame:
//!
//! ```sh
//! RUST_LOG=trace cargo run --example terminal
//! ```

use std::sync::Arc;

use bytes::Bytes;
use sps_core::protocol::frame_to_text;
use sps_tokio::metrics::{format_metrics, global_metrics};
use sps_tokio::{scan, LinkSession, MemTransport, SpsConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = SpsConfig::default();
    let transport = Arc::new(MemTransport::new());
    let mut device = transport.register_peer("demo-device", Some("sps-demo"), Some(-38));

    // Discovery: the registered device shows up in a scan.
    for found in scan(transport.as_ref(), &config).await? {
        println!(
            "discovered {} (name: {}, rssi: {})",
            found.id,
            found.name.as_deref().unwrap_or("?"),
            found.rssi.map_or("?".into(), |r| r.to_string()),
        );
    }

    let session =
        LinkSession::connect(transport.clone(), "demo-device".to_string(), config).await?;
    info!("link established");

    // The scripted remote side: note its initial allowance, then grant us
    // a few sends of our own.
    let allowance = device.next_grant().await.expect("initial grant");
    println!("device received an initial allowance of {allowance} credits");
    device.grant(5).await?;

    for line in ["hello", "credit flow", "over SPS"] {
        session.send_text(line).await?;
        let frame = device.next_frame().await.expect("frame on the wire");
        let echoed = frame_to_text(&frame)?.to_uppercase();
        device.inject_frame(Bytes::from(echoed)).await?;

        let reply = session.recv().await.expect("echo reply");
        println!("sent {line:?}, device echoed {:?}", frame_to_text(&reply)?);
    }

    let (outbound, inbound) = session.credits().await?;
    println!("credit balances: outbound={outbound}, inbound={inbound}");

    session.disconnect().await?;
    let sentinel = device.next_grant().await.expect("credits byte");
    println!("device saw credits byte 0x{sentinel:02X} — the disconnect sentinel");

    println!("\n{}", format_metrics(&global_metrics().snapshot()));
    Ok(())
}
