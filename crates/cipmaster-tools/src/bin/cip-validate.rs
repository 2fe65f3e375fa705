use cipmaster_client::validate_config;
use cipmaster_tools::{locate_config, render_rows, OutputFormat};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cip-validate")]
struct Args {
    /// Config file path, or a file name looked up in the config directories.
    config: String,
    /// Extra directory to search; may be repeated. Searched before the defaults.
    #[arg(long = "dir")]
    dirs: Vec<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let path = locate_config(&args.config, &args.dirs);
    let report = validate_config(&path);
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => {
            println!("{}", path.display());
            print!(
                "{}",
                render_rows(
                    report
                        .checks
                        .iter()
                        .map(|check| (check.name, check.status.to_string()))
                )
            );
            if let (Some(ot), Some(to)) = (&report.ot, &report.to) {
                println!(
                    "OT {} bytes, TO {} bytes",
                    ot.size_bytes(),
                    to.size_bytes()
                );
            }
        }
    }

    if !report.overall {
        std::process::exit(1);
    }
    Ok(())
}
