use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};

use iio_ring::{AcquisitionConfig, Bus, CancellationToken, Error, SampleSet, Session};

/// Access industrial I/O ring buffers
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Name of the device to work on
    #[arg(short = 'D', long = "device", value_name = "NAME", required_unless_present = "path")]
    name: Option<String>,
    /// Path of the device to work on
    #[arg(short = 'P', long, value_name = "DEVICE_PATH", conflicts_with = "name")]
    path: Option<PathBuf>,
    /// Ring buffer length, in sample sets
    #[arg(short = 'l', long, default_value_t = AcquisitionConfig::default().ring_length)]
    length: usize,
    /// Bind this trigger before streaming
    #[arg(short, long, value_name = "TRIGGER")]
    trigger: Option<String>,
    /// Output CSV formatted data
    #[arg(short, long)]
    csv: bool,
    /// Increase verbosity (may be given multiple times)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn stdout_error(error: io::Error) -> Error {
    Error::Io { path: "<stdout>".into(), source: error }
}

fn print_set(out: &mut impl Write, set: &SampleSet, csv: bool) -> io::Result<()> {
    let separator = if csv { "," } else { " " };
    for value in set.values.iter() {
        write!(out, "{:+.3}{}", value, separator)?;
    }
    writeln!(out, "{}", set.timestamp)
}

fn run(args: &Args) -> iio_ring::Result<()> {
    let bus = Bus::open();
    let device = match (&args.name, &args.path) {
        (_, Some(path)) => bus.open_device_path(path)?,
        (Some(name), None) => bus.open_device_by_name(name)?,
        (None, None) => return Err(Error::Other("no device selected".to_owned())),
    };
    println!("Device\n  path: {}\n  name: {}\n  number: {}",
        device.path().display(), device.name(), device.number());

    let ring_buffer = device.ring_buffer()?
        .ok_or_else(|| Error::Other("industrial I/O device has no ring buffer".to_owned()))?;
    println!("Buffer\n  path: {}\n  event: {}\n  access: {}",
        ring_buffer.path().display(), ring_buffer.event_path().display(),
        ring_buffer.access_path().display());

    if let Some(trigger) = &args.trigger {
        iio_ring::set_trigger(&device, trigger)?;
    }
    match iio_ring::get_trigger(&device) {
        Ok(trigger) => println!("Trigger: {}", trigger),
        Err(error) => log::warn!("cannot read trigger: {}", error),
    }

    let token = CancellationToken::new();
    token.cancel_on_signals()?;

    let config = AcquisitionConfig { ring_length: args.length };
    let mut session = Session::new(&device, &config)?;
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    if args.csv {
        for field in session.layout().fields() {
            write!(out, "{},", field.name).map_err(stdout_error)?;
        }
        writeln!(out, "timestamp").map_err(stdout_error)?;
    }
    session.arm()?;
    session.open_streams()?;
    let stats = session.run(&token, |set| {
        print_set(&mut out, &set, args.csv).map_err(stdout_error)
    })?;
    out.flush().map_err(stdout_error)?;
    log::info!("{} sample sets from {} events", stats.sample_sets, stats.events);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
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
            eprintln!("iio_ring: {}", error);
            ExitCode::FAILURE
        }
    }
}
