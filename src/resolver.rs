//! DNS query resolution logic.
//!
//! Handles the per-request pipeline:
//! 1. Decode the query (malformed input gets no reply)
//! 2. Look the name up in the local record table
//! 3. Answer locally (blocked or known address) or forward upstream
//!
//! Transports handle the actual I/O, the resolver handles decisions.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::dns::{DnsQuery, Header, ResponseKind, TYPE_A, build_response};
use crate::forward::Forwarder;
use crate::records::{Lookup, RecordTable};
use crate::stats::Stats;

/// Action to take for a decoded query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryAction {
    /// Name is blocked, answer NXDOMAIN whatever the query type.
    Blocked,
    /// Name is known and an A record was asked for.
    Answer(Ipv4Addr),
    /// Relay the query upstream.
    Forward,
}

/// Resolver handles DNS query processing decisions.
///
/// Shared by every worker task; holds only read-only state and counters.
pub struct Resolver<F> {
    records: Arc<RecordTable>,
    forwarder: F,
    stats: Arc<Stats>,
}

impl<F: Forwarder> Resolver<F> {
    pub fn new(records: Arc<RecordTable>, forwarder: F) -> Self {
        Self {
            records,
            forwarder,
            stats: Arc::new(Stats::new()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<Stats>) -> Self {
        self.stats = stats;
        self
    }

    /// Decide how to answer `query`.
    ///
    /// A blocked entry wins over the query type; a known name queried for
    /// anything other than A is forwarded.
    pub fn classify(&self, query: &DnsQuery) -> QueryAction {
        match self.records.lookup(&query.domain) {
            Some(Lookup::Blocked) => QueryAction::Blocked,
            Some(Lookup::Address(addr)) if query.qtype == TYPE_A => QueryAction::Answer(addr),
            _ => QueryAction::Forward,
        }
    }

    /// Process a raw query and produce the raw reply, if any.
    ///
    /// Returns `None` for malformed input. Upstream replies are returned
    /// unmodified; a failed upstream exchange becomes SERVFAIL.
    pub async fn resolve(&self, packet: &[u8]) -> Option<Vec<u8>> {
        let start = Instant::now();

        let query = match DnsQuery::parse(packet) {
            Ok(query) => query,
            Err(e) => {
                debug!(error = %e, len = packet.len(), "dropping malformed query");
                self.stats.record_dropped();
                return None;
            }
        };

        let domain = query.domain.as_str();
        let qtype = query.qtype;

        match self.classify(&query) {
            QueryAction::Blocked => {
                debug!(domain, qtype, "blocked locally, answering NXDOMAIN");
                let response = build_response(&query, packet, ResponseKind::Blocked);
                self.stats.record_blocked(start.elapsed());
                Some(response)
            }
            QueryAction::Answer(addr) => {
                debug!(domain, qtype, %addr, "answering from local records");
                let response = build_response(&query, packet, ResponseKind::LocalAnswer(addr));
                self.stats.record_local(start.elapsed());
                Some(response)
            }
            QueryAction::Forward => match self.forwarder.forward(packet).await {
                Ok(reply) => {
                    if let Some(header) = Header::parse(&reply) {
                        trace!(
                            domain,
                            answers = header.ancount,
                            rcode = header.rcode(),
                            "upstream reply"
                        );
                    }
                    debug!(domain, qtype, elapsed = ?start.elapsed(), "forwarded");
                    self.stats.record_forwarded(start.elapsed());
                    Some(reply)
                }
                Err(e) => {
                    warn!(domain, qtype, error = %e, "upstream failed, answering SERVFAIL");
                    let response = build_response(&query, packet, ResponseKind::ServerFailure);
                    self.stats.record_failed(start.elapsed());
                    Some(response)
                }
            },
        }
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }
}
