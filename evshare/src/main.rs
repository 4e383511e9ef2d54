mod bus;
mod client;
mod config;
mod emulator;
mod focus;
mod grabber;
mod sender;
mod server;
mod shortcut;

use anyhow::{anyhow, Context, Error};
use bus::{DeviceBatch, Notification, Remote, Subject};
use clap::Parser;
use config::{Config, Overrides};
use emulator::Emulator;
use focus::FocusManager;
use grabber::Grabber;
use input::ReaderManager;
use log::LevelFilter;
use sender::EventSender;
use shortcut::ShortcutDetector;
use std::path::PathBuf;
use std::process;
use tokio::sync::mpsc;

const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";

#[derive(clap::Subcommand)]
enum Verb {
    /// Share local devices with connecting clients.
    Server,
    /// Replay a server's devices on this machine.
    Client,
    /// Print every event handler with its device name.
    List,
}

#[derive(clap::Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    verb: Verb,

    #[clap(short, long, value_parser, default_value = "/etc/evshare/config.toml")]
    config_path: PathBuf,

    #[clap(flatten)]
    overrides: Overrides,
}

fn print_devices() -> Result<(), Error> {
    let devices = input::list().context("Cannot list input devices")?;
    for (handler, name) in devices {
        println!("{}\t{}", handler, name.as_deref().unwrap_or("?"));
    }

    Ok(())
}

fn identification(config: &Config) -> String {
    if let Some(identification) = &config.identification {
        return identification.clone();
    }

    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            log::warn!("Cannot get host name: {}", err);
            "unknown".to_owned()
        }
    }
}

async fn serve(config: Config) -> Result<(), Error> {
    let paths = if config.devices.is_empty() {
        input::discover().context("Cannot list input devices")?
    } else {
        input::resolve(&config.devices)
    };

    let mut readers = ReaderManager::open(&paths);
    if readers.is_empty() {
        return Err(anyhow!("No usable input devices"));
    }

    for device in readers.devices() {
        log::info!("Sharing {:?} ({})", device.name(), device.path().display());
    }

    let subject = Subject::new();
    let focus = bus::spawn("focus", FocusManager::new(subject.clone()))?;
    let shortcuts = bus::spawn(
        "shortcut",
        ShortcutDetector::new(&config.shortcuts, subject.clone()),
    )?;
    let grabber = bus::spawn("grabber", Grabber::new(readers.devices().to_vec()))?;
    let sender = bus::spawn("sender", EventSender::new())?;
    for subscription in [&focus, &shortcuts, &grabber, &sender] {
        subject.attach(subscription);
    }

    let publisher = subject.clone();
    readers.start(move |device: &str, events| {
        publisher.notify(Notification::Device(DeviceBatch {
            device: device.to_owned(),
            events,
        }))
    })?;

    let address = config
        .address
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_owned());
    let server = server::run_server((address, config.port), readers.descriptors(), subject.clone());
    let result = tokio::select! {
        result = server => result.map(|_| ()),
        result = tokio::signal::ctrl_c() => {
            log::info!("Exiting on signal");
            result.context("Cannot set up signal handler")
        }
    };

    // The grabber goes first so a late focus change cannot grab again.
    tokio::task::block_in_place(|| {
        grabber.stop(&subject);
        readers.release_all();
        for subscription in [sender, shortcuts, focus] {
            subscription.stop(&subject);
        }
    });

    result
}

async fn connect(config: Config) -> Result<(), Error> {
    let address = config
        .address
        .clone()
        .ok_or_else(|| anyhow!("No server address given (use --address)"))?;
    let identification = identification(&config);

    let subject = Subject::new();
    let (failure_sender, failures) = mpsc::unbounded_channel();
    let emulator = bus::spawn("emulator", Emulator::new(failure_sender))?;
    subject.attach(&emulator);

    let client = client::run_client(
        address,
        config.port,
        identification,
        subject.clone(),
        failures,
    );
    let result = tokio::select! {
        result = client => result.map(|_| ()),
        result = tokio::signal::ctrl_c() => {
            log::info!("Exiting on signal");
            result.context("Cannot set up signal handler")
        }
    };

    subject.notify(Notification::Remote(Remote::Closed));
    tokio::task::block_in_place(|| emulator.stop(&subject));

    result
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = Config::load(&args.config_path, &args.overrides);
    let verbose = match &config {
        Ok(config) => config.verbose,
        Err(_) => args.overrides.verbose,
    };

    env_logger::builder()
        .format_timestamp(None)
        .filter(
            None,
            if verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
        )
        .parse_default_env()
        .init();

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            log::error!("Error reading config: {}", err);
            process::exit(1);
        }
    };

    let result = match args.verb {
        Verb::List => print_devices(),
        Verb::Server | Verb::Client if !nix::unistd::Uid::effective().is_root() => {
            Err(anyhow!("Must be run as root"))
        }
        Verb::Server => serve(config).await,
        Verb::Client => connect(config).await,
    };

    if let Err(err) = result {
        log::error!("Error: {:#}", err);
        process::exit(1);
    }
}
