use anyhow::Context;
use iqdemod_core::config::{OutputConfig, UdpOutput};
use iqdemod_core::protocol;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Unicast,
    Broadcast,
    Multicast,
}

impl AddressKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unicast => "unicast",
            Self::Broadcast => "broadcast",
            Self::Multicast => "multicast",
        }
    }
}

/// Classifies a destination. Any address ending in `.255` is treated as a
/// subnet broadcast.
pub fn classify(addr: Ipv4Addr) -> AddressKind {
    if addr.is_multicast() {
        AddressKind::Multicast
    } else if addr.is_broadcast() || addr.octets()[3] == 255 {
        AddressKind::Broadcast
    } else {
        AddressKind::Unicast
    }
}

pub struct UdpSink {
    socket: UdpSocket,
    dest: SocketAddr,
    kind: AddressKind,
    max_datagram_bytes: usize,
    datagrams_sent: u64,
    send_errors: u64,
}

impl UdpSink {
    pub async fn open(cfg: &UdpOutput) -> anyhow::Result<Self> {
        let ip: Ipv4Addr = cfg
            .address
            .trim()
            .parse()
            .with_context(|| format!("parse output address {:?}", cfg.address))?;
        let kind = classify(ip);

        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
            .await
            .context("bind UDP socket")?;
        match kind {
            AddressKind::Multicast => {
                socket
                    .set_multicast_ttl_v4(cfg.multicast_ttl)
                    .context("set multicast TTL")?;
                socket
                    .set_multicast_loop_v4(false)
                    .context("disable multicast loopback")?;
            }
            AddressKind::Broadcast => {
                socket.set_broadcast(true).context("enable SO_BROADCAST")?;
            }
            AddressKind::Unicast => {}
        }

        let dest = SocketAddr::V4(SocketAddrV4::new(ip, cfg.port));
        tracing::info!(
            dest = %dest,
            kind = kind.as_str(),
            max_datagram_bytes = cfg.max_datagram_bytes,
            "UDP audio output ready"
        );
        Ok(Self {
            socket,
            dest,
            kind,
            max_datagram_bytes: cfg.max_datagram_bytes,
            datagrams_sent: 0,
            send_errors: 0,
        })
    }

    async fn send(&mut self, bytes: &[u8]) {
        for datagram in protocol::datagrams(bytes, self.max_datagram_bytes) {
            match self.socket.send_to(datagram, self.dest).await {
                Ok(_) => self.datagrams_sent += 1,
                Err(e) => {
                    self.send_errors += 1;
                    tracing::warn!(
                        dest = %self.dest,
                        error = %e,
                        send_errors = self.send_errors,
                        "UDP send failed"
                    );
                }
            }
        }
    }
}

pub enum AudioSink {
    Stdout(tokio::io::Stdout),
    Udp(UdpSink),
}

impl AudioSink {
    pub async fn open(cfg: &OutputConfig) -> anyhow::Result<Self> {
        match cfg {
            OutputConfig::Stdout => Ok(Self::Stdout(tokio::io::stdout())),
            OutputConfig::Udp(udp) => Ok(Self::Udp(UdpSink::open(udp).await?)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Stdout(_) => "stdout".to_string(),
            Self::Udp(udp) => format!("udp {} ({})", udp.dest, udp.kind.as_str()),
        }
    }

    /// Delivers one encoded audio block. Stdout errors (a closed pipe) end
    /// the stream; UDP errors are logged and counted.
    pub async fn send(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        match self {
            Self::Stdout(out) => {
                out.write_all(bytes).await.context("write audio to stdout")?;
                out.flush().await.context("flush stdout")?;
            }
            Self::Udp(udp) => udp.send(bytes).await,
        }
        Ok(())
    }
}

/// Drains encoded blocks from the DSP thread until the channel closes.
pub async fn run_transport(mut sink: AudioSink, mut rx: mpsc::Receiver<Vec<u8>>) {
    let mut bytes_sent = 0u64;
    while let Some(block) = rx.recv().await {
        if let Err(e) = sink.send(&block).await {
            tracing::warn!(error = ?e, "audio output closed");
            break;
        }
        bytes_sent += block.len() as u64;
    }

    match &sink {
        AudioSink::Udp(udp) => tracing::info!(
            bytes_sent,
            datagrams = udp.datagrams_sent,
            send_errors = udp.send_errors,
            "transport stopped"
        ),
        AudioSink::Stdout(_) => tracing::info!(bytes_sent, "transport stopped"),
    }
}
