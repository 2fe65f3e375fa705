//! Read the Identity object and list the assembly instances of an adapter.
//!
//! Usage:
//!   cargo run -p cipmaster-client --example read_identity -- --ip 10.0.1.1

use cipmaster_client::WireClient;
use cipmaster_datalink::EnipEndpoint;
use std::net::Ipv4Addr;

const CLASS_IDENTITY: u16 = 0x01;
const CLASS_ASSEMBLY: u16 = 0x04;
const ATTR_VENDOR_ID: u16 = 1;
const ATTR_PRODUCT_NAME: u16 = 7;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let ip: Ipv4Addr = std::env::args()
        .skip_while(|a| a != "--ip")
        .nth(1)
        .expect("usage: --ip <adapter-ip>")
        .parse()?;

    // Opens the explicit TCP session and registers it.
    let endpoint = EnipEndpoint::new(ip, EnipEndpoint::DEFAULT_MULTICAST_GROUP);
    let client = WireClient::open(endpoint).await?;

    let vendor = client
        .get_attribute(CLASS_IDENTITY, 1, ATTR_VENDOR_ID)
        .await?;
    println!("vendor id: {vendor:02X?}");

    // Product name is a SHORT_STRING: one length byte, then the text.
    let name = client
        .get_attribute(CLASS_IDENTITY, 1, ATTR_PRODUCT_NAME)
        .await?;
    if let Some((_, text)) = name.split_first() {
        println!("product name: {}", String::from_utf8_lossy(text));
    }

    let assemblies = client.get_list_of_instances(CLASS_ASSEMBLY).await?;
    println!("assembly instances: {assemblies:?}");

    client.close().await;
    Ok(())
}
