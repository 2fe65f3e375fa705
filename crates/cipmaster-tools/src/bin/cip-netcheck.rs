use cipmaster_client::network::check_network;
use cipmaster_client::{HostPlatform, SystemRunner};
use cipmaster_datalink::EnipEndpoint;
use cipmaster_tools::{render_rows, OutputFormat};
use clap::Parser;
use std::net::Ipv4Addr;

#[derive(Parser, Debug)]
#[command(name = "cip-netcheck")]
struct Args {
    #[arg(long, default_value_t = EnipEndpoint::DEFAULT_IP)]
    ip: Ipv4Addr,
    #[arg(long, default_value_t = EnipEndpoint::DEFAULT_MULTICAST_GROUP)]
    multicast: Ipv4Addr,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let result = check_network(
        &args.ip.to_string(),
        &args.multicast.to_string(),
        &HostPlatform,
        &SystemRunner,
    );

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => {
            let mut rows: Vec<_> = result
                .summary()
                .into_iter()
                .map(|(label, status)| (label, status.to_string()))
                .collect();
            rows.push((
                "Multicast Route",
                result.route.clone().unwrap_or_else(|| "-".to_string()),
            ));
            print!("{}", render_rows(rows));
        }
    }

    if !(result.reachable && result.multicast_supported) {
        std::process::exit(1);
    }
    Ok(())
}
