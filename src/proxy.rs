//! DNS relay orchestration.
//!
//! Loads the local records, binds the transport and runs the relay.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::Result;
use crate::forward::UdpForwarder;
use crate::records::RecordTable;
use crate::resolver::Resolver;
use crate::stats::Stats;
use crate::transport::udp::UdpTransport;

/// Configuration for the DNS relay.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Local address to bind (e.g., 0.0.0.0:53)
    pub bind_addr: SocketAddr,
    /// Upstream resolver that unknown names are forwarded to
    pub upstream: SocketAddr,
    /// How long to wait for each upstream reply
    pub upstream_timeout: Duration,
    /// Local records file (`<ipv4> <domain>` per line)
    pub records_path: PathBuf,
    /// How often to log request counters
    pub stats_interval: Duration,
}

/// Run the DNS relay with the given configuration.
///
/// Fails if the records file cannot be read or the socket cannot be bound.
/// Otherwise runs until Ctrl-C; in-flight requests are dropped.
pub async fn run(config: ProxyConfig) -> Result<()> {
    let records = Arc::new(RecordTable::load(&config.records_path)?);
    info!(
        path = %config.records_path.display(),
        records = records.len(),
        blocked = records.blocked_count(),
        "loaded local records"
    );

    let stats = Arc::new(Stats::new());
    let forwarder = UdpForwarder::new(config.upstream).with_timeout(config.upstream_timeout);
    let resolver = Arc::new(Resolver::new(records, forwarder).with_stats(stats.clone()));

    let udp = UdpTransport::bind(config.bind_addr).await?;
    info!(
        listen = %udp.local_addr()?,
        upstream = %config.upstream,
        "DNS relay started"
    );
    let receiver = udp.start(resolver);

    // Log stats every interval
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.stats_interval);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let s = stats.snapshot_and_reset();
            info!(
                uptime = s.uptime_secs,
                requests = s.requests,
                local = s.local,
                blocked = s.blocked,
                forwarded = s.forwarded,
                failed = s.failed,
                dropped = s.dropped,
                avg_response_ms = %format!("{:.2}", s.avg_response_ms),
                "stats"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    receiver.abort();
    reporter.abort();

    Ok(())
}
