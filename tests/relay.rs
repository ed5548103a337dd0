use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::net::UdpSocket;

use dnsrelay::dns::{HEADER_LEN, Header, Rcode, TYPE_A, TYPE_AAAA, build_query};
use dnsrelay::forward::UdpForwarder;
use dnsrelay::records::RecordTable;
use dnsrelay::resolver::Resolver;
use dnsrelay::transport::MAX_DNS_PACKET_SIZE;
use dnsrelay::transport::udp::UdpTransport;

const RECORDS: &str = "\
# test records
1.2.3.4 example.com
0.0.0.0 blocked.test
5.6.7.8 host.test
";

/// Upstream that echoes every query back with `upstream` appended, or stays silent.
struct FakeUpstream {
    addr: SocketAddr,
    queries: Arc<AtomicUsize>,
}

async fn fake_upstream(answer: bool) -> FakeUpstream {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let queries = Arc::new(AtomicUsize::new(0));

    let counter = queries.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; MAX_DNS_PACKET_SIZE];
        loop {
            let (len, src) = socket.recv_from(&mut buf).await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            if answer {
                let mut reply = buf[..len].to_vec();
                reply[2] |= 0x80;
                reply.extend_from_slice(b"upstream");
                socket.send_to(&reply, src).await.unwrap();
            }
        }
    });

    FakeUpstream { addr, queries }
}

async fn start_relay(upstream: SocketAddr) -> SocketAddr {
    let records = Arc::new(RecordTable::parse(RECORDS));
    let forwarder = UdpForwarder::new(upstream).with_timeout(Duration::from_millis(200));
    let resolver = Arc::new(Resolver::new(records, forwarder));

    let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = transport.local_addr().unwrap();
    transport.start(resolver);
    addr
}

async fn ask(relay: SocketAddr, query: &[u8]) -> Option<Vec<u8>> {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(query, relay).await.unwrap();

    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];
    match tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf)).await {
        Ok(result) => Some(buf[..result.unwrap().0].to_vec()),
        Err(_) => None,
    }
}

#[tokio::test]
async fn local_record_is_answered() {
    let upstream = fake_upstream(true).await;
    let relay = start_relay(upstream.addr).await;
    let query = build_query(0xABCD, "example.com", TYPE_A).unwrap();

    let response = ask(relay, &query).await.unwrap();
    let header = Header::parse(&response).unwrap();

    assert_eq!(header.id, 0xABCD);
    assert!(header.is_response());
    assert_eq!(header.rcode(), Rcode::NoError as u8);
    assert_eq!(header.ancount, 1);
    assert_eq!(&response[HEADER_LEN..query.len()], &query[HEADER_LEN..]);
    assert_eq!(&response[response.len() - 4..], &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(upstream.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blocked_record_gets_nxdomain() {
    let upstream = fake_upstream(true).await;
    let relay = start_relay(upstream.addr).await;

    let response = ask(relay, &build_query(7, "blocked.test", TYPE_A).unwrap()).await.unwrap();
    let header = Header::parse(&response).unwrap();

    assert_eq!(header.rcode(), Rcode::NxDomain as u8);
    assert_eq!(header.ancount, 0);
    assert_eq!(upstream.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_name_is_relayed_verbatim() {
    let upstream = fake_upstream(true).await;
    let relay = start_relay(upstream.addr).await;
    let query = build_query(8, "unknown.test", TYPE_A).unwrap();

    let response = ask(relay, &query).await.unwrap();

    assert!(response.ends_with(b"upstream"));
    assert_eq!(&response[..2], &query[..2]);
    assert_eq!(upstream.queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn silent_upstream_gives_servfail() {
    let upstream = fake_upstream(false).await;
    let relay = start_relay(upstream.addr).await;

    let response = ask(relay, &build_query(0x0909, "unknown.test", TYPE_A).unwrap()).await.unwrap();
    let header = Header::parse(&response).unwrap();

    assert_eq!(header.id, 0x0909);
    assert_eq!(header.rcode(), Rcode::ServFail as u8);
    assert_eq!(header.ancount, 0);
    assert_eq!(upstream.queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn known_name_aaaa_query_is_forwarded() {
    let upstream = fake_upstream(true).await;
    let relay = start_relay(upstream.addr).await;

    let response = ask(relay, &build_query(9, "host.test", TYPE_AAAA).unwrap()).await.unwrap();

    assert!(response.ends_with(b"upstream"));
    assert_eq!(upstream.queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_query_gets_no_reply() {
    let upstream = fake_upstream(true).await;
    let relay = start_relay(upstream.addr).await;

    let mut overrun = build_query(10, "example.com", TYPE_A).unwrap();
    overrun[HEADER_LEN] = 0x3F;

    assert_eq!(ask(relay, &[0x12, 0x34, 0x01, 0x00, 0x00]).await, None);
    assert_eq!(ask(relay, &overrun).await, None);
    assert_eq!(upstream.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_forward_does_not_block_local_answers() {
    let upstream = fake_upstream(false).await;
    let relay = start_relay(upstream.addr).await;

    let forwarded = tokio::spawn(async move {
        let query = build_query(1, "unknown.test", TYPE_A).unwrap();
        ask(relay, &query).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let local = tokio::time::timeout(
        Duration::from_millis(100),
        ask(relay, &build_query(2, "example.com", TYPE_A).unwrap()),
    )
    .await
    .expect("local answer waited on the forward");

    assert!(local.is_some());
    assert!(forwarded.await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_clients_get_their_own_replies() {
    let upstream = fake_upstream(true).await;
    let relay = start_relay(upstream.addr).await;

    let queries: Vec<Vec<u8>> = (0..32u16)
        .map(|id| {
            let domain = if id % 2 == 0 { "example.com" } else { "unknown.test" };
            build_query(id, domain, TYPE_A).unwrap()
        })
        .collect();

    let responses = join_all(queries.iter().map(|q| ask(relay, q))).await;

    for (query, response) in queries.iter().zip(responses) {
        let response = response.unwrap();
        assert_eq!(&response[..2], &query[..2]);
    }
    assert_eq!(upstream.queries.load(Ordering::SeqCst), 16);
}
