use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, bail};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wifista::{
    ConnectionManager, ConnectionOutcome, ManagerConfig, config,
    wifi::{WifiDriver, sim::SimulatedDriver},
};

/// Station-mode Wi-Fi manager: scan, connect with bounded retry, ping
#[derive(Parser, Debug)]
#[command(
    name = "wifista",
    author = "Soham Waghmare",
    about = "Station-mode Wi-Fi manager: scan, connect with bounded retry, and ping.",
    long_about = None,
    version = env!("CARGO_PKG_VERSION"),
    disable_version_flag = true
)]
struct Args {
    /// Print version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: (),

    /// Use the simulated radio instead of the host adapter
    #[arg(long)]
    simulate: bool,

    /// Reconnect attempts allowed per connect before giving up
    #[arg(long = "max-attempts", default_value_t = config::MAX_CONNECT_ATTEMPTS)]
    max_attempts: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List nearby access points
    Scan {
        /// Maximum number of records to return
        #[arg(long, default_value_t = config::DEFAULT_SCAN_CAPACITY)]
        capacity: u16,
    },
    /// Join a network, optionally pinging a host once connected
    Connect {
        ssid: String,

        /// Passphrase; omit for open networks
        #[arg(long, default_value = "")]
        password: String,

        /// Seconds to wait for an outcome
        #[arg(long, default_value_t = config::CONNECTION_TIMEOUT_SECS)]
        timeout: u64,

        /// Address to ping after connecting
        #[arg(long)]
        ping: Option<String>,

        #[arg(long, default_value_t = config::DEFAULT_PING_COUNT)]
        count: u32,
    },
    /// Send echo requests to an address
    Ping {
        addr: String,

        #[arg(long, default_value_t = config::DEFAULT_PING_COUNT)]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ManagerConfig::default().with_max_attempts(args.max_attempts);

    #[cfg(windows)]
    if !args.simulate {
        let manager = ConnectionManager::new(wifista::wifi::windows::WlanDriver::new(), config);
        return run(&manager, args.command).await;
    }

    if !args.simulate {
        info!("no native radio backend on this platform, using the simulated driver");
    }
    let manager = ConnectionManager::new(SimulatedDriver::demo(), config);
    run(&manager, args.command).await
}

async fn run<D: WifiDriver>(manager: &ConnectionManager<D>, command: Command) -> Result<()> {
    manager.initialize().wrap_err("failed to bring up the station")?;

    let result = match command {
        Command::Scan { capacity } => scan(manager, capacity).await,
        Command::Connect {
            ssid,
            password,
            timeout,
            ping: target,
            count,
        } => {
            connect(manager, &ssid, &password, Duration::from_secs(timeout)).await?;
            match target {
                Some(target) => ping(manager, &target, count).await,
                None => Ok(()),
            }
        }
        Command::Ping { addr, count } => ping(manager, &addr, count).await,
    };

    manager.deactivate()?;
    result
}

async fn scan<D: WifiDriver>(manager: &ConnectionManager<D>, capacity: u16) -> Result<()> {
    let records = manager.scan(capacity).await?;
    println!("{:<32}  {:>5}", "SSID", "RSSI");
    for ap in &records {
        println!("{:<32}  {:>5}", ap.ssid, ap.rssi);
    }
    println!("{} network(s)", records.len());
    Ok(())
}

async fn connect<D: WifiDriver>(
    manager: &ConnectionManager<D>,
    ssid: &str,
    password: &str,
    timeout: Duration,
) -> Result<()> {
    match manager.connect(ssid, password, timeout).await? {
        ConnectionOutcome::Connected => {
            match manager.ip_address() {
                Some(ip) => println!("connected to {ssid}, ip {ip}"),
                None => println!("connected to {ssid}"),
            }
            Ok(())
        }
        ConnectionOutcome::Failed => bail!(
            "failed to connect to {ssid} after {} attempt(s)",
            manager.attempt_count()
        ),
        ConnectionOutcome::TimedOut => {
            bail!("no result from {ssid} within {}s", timeout.as_secs())
        }
    }
}

async fn ping<D: WifiDriver>(manager: &ConnectionManager<D>, target: &str, count: u32) -> Result<()> {
    let report = manager.ping(target, count)?.wait().await?;
    println!(
        "--- {} ping statistics ---\n{} packets transmitted, {} received, {}% packet loss, time {}ms",
        report.target,
        report.transmitted,
        report.received,
        report.loss_percent(),
        report.elapsed_ms
    );
    Ok(())
}
