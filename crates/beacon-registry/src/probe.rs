//! Wire prober — confirms a server actually answers its UDP protocol and
//! measures the round trip.
//!
//! One probe is a two-step exchange: send the 8-byte hello, wait for the
//! reply carrying our assigned peer id, then tear the session down with a
//! disconnect frame so the remote does not hold a half-open slot.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;
use zerocopy::AsBytes;

use beacon_core::wire::{parse_assigned_peer_id, DisconnectFrame, HelloFrame};

/// Per-attempt reply deadline.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Stop once this many exchanges succeeded...
pub const REQUIRED_SUCCESSES: usize = 3;

/// ...or once this many attempts failed, whichever comes first. Bounds the
/// total probe latency under packet loss.
pub const MAX_FAILURES: usize = 3;

const MAX_REPLY_LEN: usize = 1024;

/// Why a probe concluded "unreachable". Setup trouble and handshake
/// timeouts read the same to the operator but log differently.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("unable to get address info for {address}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("no addresses found for {address}")]
    NoAddresses { address: String },

    #[error("socket setup for {endpoint} failed")]
    Setup {
        endpoint: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("{endpoint} refused the probe")]
    Refused { endpoint: SocketAddr },

    #[error("{endpoint} did not respond to probe")]
    NoResponse { endpoint: SocketAddr },
}

/// Resolve a claimed address the way a datagram client would.
pub async fn resolve_udp(address: &str, port: u16) -> Result<Vec<SocketAddr>, ProbeError> {
    let found = lookup_host((address, port))
        .await
        .map_err(|source| ProbeError::Resolve {
            address: address.to_string(),
            source,
        })?;

    let mut endpoints: Vec<SocketAddr> = Vec::new();
    for addr in found {
        if !endpoints.contains(&addr) {
            endpoints.push(addr);
        }
    }
    if endpoints.is_empty() {
        return Err(ProbeError::NoAddresses {
            address: address.to_string(),
        });
    }
    Ok(endpoints)
}

/// Probe one endpoint. Returns the minimum round trip in seconds.
///
/// The minimum, not the average: one congested attempt should not make a
/// healthy server look slow. Connection-refused means nothing is listening
/// there at all, so it aborts the retry loop immediately.
pub async fn probe_endpoint(endpoint: SocketAddr) -> Result<f64, ProbeError> {
    let bind_addr: SocketAddr = if endpoint.is_ipv4() {
        "0.0.0.0:0".parse().unwrap()
    } else {
        "[::]:0".parse().unwrap()
    };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|source| ProbeError::Setup { endpoint, source })?;
    socket
        .connect(endpoint)
        .await
        .map_err(|source| ProbeError::Setup { endpoint, source })?;

    let hello = HelloFrame::new();
    let mut buf = [0u8; MAX_REPLY_LEN];
    let mut rtts: Vec<f64> = Vec::new();
    let mut failures = 0usize;

    while rtts.len() < REQUIRED_SUCCESSES && failures < MAX_FAILURES {
        let started = Instant::now();
        if let Err(e) = socket.send(hello.as_bytes()).await {
            if e.kind() == io::ErrorKind::ConnectionRefused {
                return Err(ProbeError::Refused { endpoint });
            }
            failures += 1;
            continue;
        }

        match timeout(PROBE_TIMEOUT, socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                let rtt = started.elapsed().as_secs_f64();
                match parse_assigned_peer_id(&buf[..len]) {
                    Ok(peer_id) => {
                        // Best effort: a lost disconnect only costs the
                        // remote a session timeout.
                        let _ = socket.send(DisconnectFrame::new(peer_id).as_bytes()).await;
                        rtts.push(rtt);
                    }
                    Err(e) => {
                        tracing::debug!(%endpoint, error = %e, "unparseable probe reply");
                        failures += 1;
                    }
                }
            }
            Ok(Err(e)) => {
                if e.kind() == io::ErrorKind::ConnectionRefused {
                    return Err(ProbeError::Refused { endpoint });
                }
                failures += 1;
            }
            Err(_) => failures += 1,
        }
    }

    if rtts.is_empty() {
        return Err(ProbeError::NoResponse { endpoint });
    }
    Ok(rtts.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Probe every resolved endpoint of an announce.
///
/// All of them must answer: a client resolving to the one dead endpoint
/// would see a dead server. The reported ping is the mean of the
/// per-endpoint minima.
pub async fn probe_endpoints(endpoints: &[SocketAddr]) -> Result<f64, ProbeError> {
    let mut pings = Vec::with_capacity(endpoints.len());
    for &endpoint in endpoints {
        let ping = probe_endpoint(endpoint).await?;
        pings.push(ping);
    }
    Ok(pings.iter().sum::<f64>() / pings.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::wire::{PACKET_TYPE_ORIGINAL, PROTOCOL_ID};
    use tokio::sync::mpsc;

    /// Minimal scripted game server: answers every hello with a peer-id
    /// assignment and reports frames it saw on the channel.
    async fn spawn_fake_server(frames_tx: mpsc::UnboundedSender<Vec<u8>>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let frame = buf[..len].to_vec();
                let is_hello = len == 8 && frame[7] == PACKET_TYPE_ORIGINAL;
                let _ = frames_tx.send(frame);
                if is_hello {
                    let mut reply = [0u8; 14];
                    reply[..4].copy_from_slice(&PROTOCOL_ID);
                    reply[12] = 0xbe;
                    reply[13] = 0xef;
                    let _ = socket.send_to(&reply, peer).await;
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn probe_measures_responding_server() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let addr = spawn_fake_server(tx).await;

        let ping = probe_endpoint(addr).await.unwrap();
        assert!(ping > 0.0);
        assert!(ping < 1.0, "loopback rtt should be far below a second");
    }

    #[tokio::test]
    async fn probe_echoes_assigned_peer_id_in_disconnect() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let addr = spawn_fake_server(tx).await;

        probe_endpoint(addr).await.unwrap();

        // Frames alternate hello, disco, hello, and so on; wait for the
        // first disco to arrive.
        let mut disco = None;
        while disco.is_none() {
            let frame = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("no disconnect frame seen")
                .unwrap();
            if frame.len() == 9 {
                disco = Some(frame);
            }
        }
        let disco = disco.unwrap();
        assert_eq!(&disco[..4], &PROTOCOL_ID);
        assert_eq!(&disco[4..6], &[0xbe, 0xef], "must echo the assigned peer id");
        assert_eq!(disco[8], 0x03);
    }

    #[tokio::test]
    async fn resolve_rejects_unresolvable_name() {
        let err = resolve_udp("does-not-exist.invalid", 30000)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Resolve { .. } | ProbeError::NoAddresses { .. }));
    }
}
