use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};

use iio_ring::{Bus, Device, SensorKind};
use iio_ring::sys::SysfsTree;

/// List industrial I/O devices
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Increase verbosity (may be given multiple times)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Show only devices with the specified name
    #[arg(short = 'd', value_name = "NAME")]
    name: Option<String>,
    /// Examine only the device at this path
    #[arg(short = 'D', value_name = "DEVICE_PATH", conflicts_with = "name")]
    path: Option<PathBuf>,
}

fn dump_one_device(device: &Device<SysfsTree>, verbose: u8) -> iio_ring::Result<()> {
    const INDENT: &str = "  ";

    if verbose >= 1 {
        println!();
    }
    println!("Device {:03}: {}", device.number(), device.name());
    if verbose < 1 {
        return Ok(())
    }

    let mut current_kind: Option<SensorKind> = None;
    for channel in device.channels()? {
        if current_kind != Some(channel.kind) {
            println!("{}{}:", INDENT, channel.kind.header());
            current_kind = Some(channel.kind);
        }
        print!("{}{:<10}", INDENT, channel.name);
        if verbose >= 2 {
            print!(": {} {}", channel.value(), channel.kind.unit());
            if verbose >= 3 {
                print!(" = ({} + {}) * {}", channel.raw, channel.offset, channel.scale);
            }
        }
        println!();
    }

    if let Some(ring_buffer) = device.ring_buffer()? {
        let tree = device.tree();
        let show = |value: iio_ring::Result<i64>| value.map_or("?".to_owned(), |value| value.to_string());
        println!();
        println!("{}ring_buffer{}:", INDENT, ring_buffer.number());
        println!("{}  bps: {},\t{}  length: {}", INDENT, show(ring_buffer.bytes_per_sample(tree)),
            INDENT, show(ring_buffer.length(tree)));
        println!("{}  event:  {}", INDENT, ring_buffer.event_path().display());
        println!("{}  access: {}", INDENT, ring_buffer.access_path().display());
    }
    Ok(())
}

fn run(args: &Args) -> iio_ring::Result<()> {
    let bus = Bus::open();
    if let Some(path) = &args.path {
        return dump_one_device(&bus.open_device_path(path)?, args.verbose)
    }
    let devices = bus.list_devices()?;
    if devices.is_empty() {
        println!("No industrial I/O devices available");
    }
    for device in devices {
        if args.name.as_deref().map_or(true, |name| name == device.name()) {
            dump_one_device(&device, args.verbose)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    // each -v adds listing detail and lowers the log filter by one level
    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("lsiio: {}", error);
            ExitCode::FAILURE
        }
    }
}
