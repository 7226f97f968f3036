//! SNEP PUT between two LLCP links over an in-process MAC pair.
//!
//! Run with `RUST_LOG=llcp=debug` to watch the link traffic.

use std::time::Duration;

use llcp::mac::pipe;
use llcp::{Link, LinkConfig, MacLink, MacRole, Sap, Service};
use tracing_subscriber::EnvFilter;

const SNEP_URI: &str = "urn:nfc:sn:snep";
const SNEP_VERSION: u8 = 0x10;
const SNEP_PUT: u8 = 0x02;
const SNEP_SUCCESS: u8 = 0x81;

fn snep_put(ndef: &[u8]) -> Vec<u8> {
    let mut request = vec![SNEP_VERSION, SNEP_PUT];
    request.extend_from_slice(&u32::try_from(ndef.len()).unwrap_or(u32::MAX).to_be_bytes());
    request.extend_from_slice(ndef);
    request
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let config = LinkConfig {
        miu: 512,
        connect_timeout: Some(Duration::from_secs(1)),
        ..LinkConfig::default()
    };

    let phone = Link::new(config.clone());
    phone.register(
        Service::new(|conn| {
            while let Ok((request, from)) = conn.recv(None) {
                println!("server: {} bytes from SAP {from}", request.len());
                let response = [SNEP_VERSION, SNEP_SUCCESS, 0, 0, 0, 0];
                if conn.send(response.to_vec()).is_err() {
                    break;
                }
            }
        })
        .with_uri(SNEP_URI)
        .with_sap(Sap::SNEP)
        .with_miu(512),
    )?;

    let reader = Link::new(config);
    let local = reader.register(Service::new(|_conn| {}))?;

    let (a, b) = pipe::pair();
    let target = MacLink::new(b, phone)?.spawn(MacRole::Target)?;
    let initiator = MacLink::new(a, reader)?.spawn(MacRole::Initiator)?;

    let remote = initiator
        .link()
        .resolve(SNEP_URI)?
        .ok_or("SNEP server not found")?;
    println!("client: {SNEP_URI} is at SAP {remote}");

    let conn = initiator.link().connect(local, remote)?;
    // NDEF text record "hello"
    let ndef = [0xd1, 0x01, 0x08, 0x54, 0x02, b'e', b'n', b'h', b'e', b'l', b'l', b'o'];
    conn.send(snep_put(&ndef))?;

    let (response, _) = conn.recv(Some(Duration::from_secs(1)))?;
    println!("client: response {response:x}");
    conn.disconnect();

    let server = target.link().clone();
    initiator.deactivate();
    initiator.join()?;
    target.join()?;

    let metrics = server.metrics();
    println!(
        "server saw {} PDUs, avg exchange {:?} us",
        metrics.total_received(),
        metrics.avg_exchange_latency_us()
    );
    Ok(())
}
