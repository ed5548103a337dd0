use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dnsrelay::forward::UPSTREAM_PORT;
use dnsrelay::proxy::{self, ProxyConfig};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "dnsrelay")]
#[command(about = "UDP DNS relay with a local record table", long_about = None)]
struct Args {
    /// Local port to listen on
    #[arg(short, long, default_value_t = 53)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: Ipv4Addr,

    /// Upstream DNS server
    #[arg(short, long, default_value = "202.106.0.20")]
    upstream: Ipv4Addr,

    /// Upstream DNS server port
    #[arg(long, default_value_t = UPSTREAM_PORT)]
    upstream_port: u16,

    /// Seconds to wait for an upstream reply
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Local records file, one `<ipv4> <domain>` per line
    #[arg(short, long, default_value = "dnsrelay.txt")]
    records: PathBuf,

    /// Debug output (-d for decisions, -dd for upstream replies too)
    #[arg(short, action = clap::ArgAction::Count)]
    debug: u8,

    /// Upstream IPv4 address or records file; overrides `--upstream` or `--records`
    #[arg(value_name = "DNS_SERVER_IP|FILENAME")]
    first: Option<String>,

    /// Upstream IPv4 address or records file, whichever `first` was not
    #[arg(value_name = "DNS_SERVER_IP|FILENAME")]
    second: Option<String>,
}

impl Args {
    fn config(&self) -> ProxyConfig {
        ProxyConfig {
            bind_addr: SocketAddr::from((self.bind, self.port)),
            upstream: SocketAddr::from((self.upstream(), self.upstream_port)),
            upstream_timeout: Duration::from_secs(self.timeout),
            records_path: self.records_path(),
            stats_interval: STATS_INTERVAL,
        }
    }

    fn positional(&self) -> impl Iterator<Item = &String> {
        self.first.iter().chain(&self.second)
    }

    /// Last positional that parses as an IPv4 address, else `--upstream`.
    fn upstream(&self) -> Ipv4Addr {
        self.positional()
            .filter_map(|arg| arg.parse().ok())
            .last()
            .unwrap_or(self.upstream)
    }

    /// Last positional that is not an IPv4 address, else `--records`.
    fn records_path(&self) -> PathBuf {
        self.positional()
            .filter(|arg| arg.parse::<Ipv4Addr>().is_err())
            .last()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.records.clone())
    }

    fn log_filter(&self) -> EnvFilter {
        let level = match self.debug {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log_filter())
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    rt.block_on(proxy::run(args.config()))
        .context("DNS relay failed")
}
