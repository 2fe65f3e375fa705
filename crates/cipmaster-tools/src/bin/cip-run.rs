use cipmaster_client::fields::{set_field, shared_packet, snapshot};
use cipmaster_client::{load_config, CipSession, SessionConfig, SessionStart};
use cipmaster_core::codec::HumanValue;
use cipmaster_core::packet::PacketInstance;
use cipmaster_datalink::EnipEndpoint;
use cipmaster_tools::{locate_config, parse_assignment, render_rows, OutputFormat};
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cip-run")]
struct Args {
    /// Config file path, or a file name looked up in the config directories.
    config: String,
    #[arg(long = "dir")]
    dirs: Vec<PathBuf>,
    #[arg(long, default_value_t = EnipEndpoint::DEFAULT_IP)]
    ip: Ipv4Addr,
    #[arg(long, default_value_t = EnipEndpoint::DEFAULT_MULTICAST_GROUP)]
    multicast: Ipv4Addr,
    #[arg(long, default_value_t = EnipEndpoint::EXPLICIT_DEFAULT_PORT)]
    explicit_port: u16,
    #[arg(long, default_value_t = EnipEndpoint::IO_DEFAULT_PORT)]
    io_port: u16,
    /// How long to keep the cyclic exchange running.
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,
    /// Output field assignment applied before starting; may be repeated.
    #[arg(long = "set", value_parser = parse_assignment)]
    set: Vec<(String, String)>,
    #[arg(long)]
    heartbeat_field: Option<String>,
    #[arg(long)]
    timestamp_field: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = load_config(&locate_config(&args.config, &args.dirs))?;
    let outbound = shared_packet(PacketInstance::new(config.ot.layout.clone()));
    for (field, value) in &args.set {
        set_field(&outbound, field, &HumanValue::from(value.as_str()))?;
    }

    let mut session_config = SessionConfig::default();
    if let Some(field) = args.heartbeat_field {
        session_config = session_config.with_heartbeat_field(field);
    }
    if let Some(field) = args.timestamp_field {
        session_config = session_config.with_timestamp_field(field);
    }

    let endpoint = EnipEndpoint::new(args.ip, args.multicast)
        .with_explicit_port(args.explicit_port)
        .with_io_port(args.io_port);
    let session = CipSession::new(session_config);
    session.start(SessionStart::new(
        endpoint,
        config.connection_parameters(),
        outbound,
        config.to.layout.clone(),
    ))?;
    log::info!("session started against {endpoint}");

    tokio::time::sleep(Duration::from_secs(args.duration_secs)).await;
    session.stop().await;

    let readings = session
        .latest_inbound()
        .map(|packet| snapshot(&packet))
        .unwrap_or_default();
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&readings)?),
        OutputFormat::Table => {
            if readings.is_empty() {
                println!("no inbound frame received");
            }
            print!(
                "{}",
                render_rows(
                    readings
                        .iter()
                        .map(|r| (r.id.as_str(), format!("{} ({})", r.value, r.field_type)))
                )
            );
        }
    }

    if session.error_occurred() {
        eprintln!("session ended with an error; see the log for details");
        std::process::exit(1);
    }
    Ok(())
}
