//! The async driver for one peer connection: handshake, keepalive, and the
//! message pump between the socket and the embedding node.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

use meridian_chain::block;
use meridian_chain::parameters::Network;

use crate::codec::Codec;
use crate::constants::{
    CURRENT_VERSION, HANDSHAKE_TIMEOUT, MIN_PEER_VERSION, PING_INTERVAL, TIMEOUT_INTERVAL,
    USER_AGENT,
};
use crate::message::{Message, Version};
use crate::peer::{Direction, Peer, PeerError, PeerState};
use crate::types::{Nonce, PeerServices};

/// What a connection reports back to the node.
#[derive(Debug)]
pub enum PeerEvent {
    /// An application message arrived from an active peer.
    Message {
        addr: SocketAddr,
        message: Message,
    },
    /// A pong arrived; `latency` is measured when it answers our own ping.
    Pong {
        addr: SocketAddr,
        nonce: Nonce,
        latency: Option<Duration>,
    },
    /// The connection ended. `misbehaved` marks protocol violations
    /// (malformed frames, bad checksums, oversized bodies).
    Disconnected {
        addr: SocketAddr,
        reason: String,
        misbehaved: bool,
    },
}

/// The identity this node presents in its `version` messages.
#[derive(Clone, Debug)]
pub struct LocalIdentity {
    pub network: Network,
    pub services: PeerServices,
    pub best_height: block::Height,
    /// This connection's self-connection-detection nonce.
    pub nonce: Nonce,
    pub listen_addr: SocketAddr,
    /// Epoch seconds, stamped into the version message.
    pub now: u64,
}

impl LocalIdentity {
    fn version_for(&self, peer_addr: SocketAddr) -> Version {
        Version::new(
            CURRENT_VERSION,
            peer_addr,
            PeerServices::NODE_NETWORK,
            self.services,
            self.listen_addr,
            self.nonce,
            USER_AGENT.to_owned(),
            self.best_height,
            self.now,
        )
    }
}

/// An established, handshaken connection to one peer.
pub struct Connection {
    peer: Peer,
    framed: Framed<TcpStream, Codec>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish()
    }
}

impl Connection {
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Dial `addr` and run the outbound handshake: send `version`, expect
    /// the peer's `version`, send `verack`, expect `verack`.
    pub async fn connect(
        addr: SocketAddr,
        identity: LocalIdentity,
    ) -> Result<Connection, PeerError> {
        let stream = timeout(HANDSHAKE_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| PeerError::HandshakeTimeout)??;
        Connection::handshake(stream, addr, Direction::Outbound, identity).await
    }

    /// Run the inbound handshake on an accepted socket: expect the remote
    /// `version` first, then answer with our `version` and `verack`.
    pub async fn accept(
        stream: TcpStream,
        addr: SocketAddr,
        identity: LocalIdentity,
    ) -> Result<Connection, PeerError> {
        Connection::handshake(stream, addr, Direction::Inbound, identity).await
    }

    async fn handshake(
        stream: TcpStream,
        addr: SocketAddr,
        direction: Direction,
        identity: LocalIdentity,
    ) -> Result<Connection, PeerError> {
        let codec = Codec::builder()
            .for_network(identity.network)
            .with_metrics_label(addr.to_string())
            .finish();
        let mut framed = Framed::new(stream, codec);
        let mut peer = Peer::new(addr, direction);

        let result = timeout(HANDSHAKE_TIMEOUT, async {
            match direction {
                Direction::Outbound => {
                    framed
                        .send(Message::Version(identity.version_for(addr)))
                        .await?;
                    peer.state = PeerState::VersionSent;

                    let their_version = expect_version(&mut framed, &identity).await?;
                    peer.version = Some(their_version);
                    peer.state = PeerState::VersionReceived;

                    framed.send(Message::Verack).await?;
                    expect_verack(&mut framed).await?;
                }
                Direction::Inbound => {
                    let their_version = expect_version(&mut framed, &identity).await?;
                    peer.version = Some(their_version);
                    peer.state = PeerState::VersionReceived;

                    framed
                        .send(Message::Version(identity.version_for(addr)))
                        .await?;
                    peer.state = PeerState::VersionSent;
                    framed.send(Message::Verack).await?;
                    expect_verack(&mut framed).await?;
                }
            }
            Ok::<(), PeerError>(())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                peer.state = PeerState::Active;
                debug!(%addr, ?direction, "handshake complete");
                Ok(Connection { peer, framed })
            }
            Ok(Err(error)) => Err(error),
            Err(_) => Err(PeerError::HandshakeTimeout),
        }
    }

    /// Pump the connection until it ends: socket bytes become
    /// [`PeerEvent`]s, queued node messages go out, keepalives fire, and
    /// the shutdown flag is honored at every loop boundary.
    pub async fn run(
        mut self,
        events: mpsc::Sender<PeerEvent>,
        mut outbound: mpsc::Receiver<Message>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let addr = self.peer.addr;
        let mut tick = tokio::time::interval(Duration::from_millis(500));
        let mut last_send = Instant::now();
        let mut last_recv = Instant::now();
        let mut pending_ping: Option<(Nonce, Instant)> = None;

        let (reason, misbehaved): (String, bool) = loop {
            tokio::select! {
                _ = shutdown.changed() => break ("shutdown".into(), false),

                queued = outbound.recv() => match queued {
                    Some(message) => {
                        trace!(%addr, command = %message, "sending");
                        if let Err(error) = self.framed.send(message).await {
                            break (format!("send failed: {}", error), false);
                        }
                        last_send = Instant::now();
                    }
                    None => break ("peer handle dropped".into(), false),
                },

                received = self.framed.next() => match received {
                    Some(Ok(message)) => {
                        last_recv = Instant::now();
                        trace!(%addr, command = %message, "received");
                        match message {
                            Message::Ping(nonce) => {
                                if self.framed.send(Message::Pong(nonce)).await.is_err() {
                                    break ("pong send failed".into(), false);
                                }
                                last_send = Instant::now();
                            }
                            Message::Pong(nonce) => {
                                let latency = match pending_ping.take() {
                                    Some((expected, sent)) if expected == nonce => {
                                        let latency = sent.elapsed();
                                        self.peer.latency = Some(latency);
                                        Some(latency)
                                    }
                                    other => {
                                        pending_ping = other;
                                        None
                                    }
                                };
                                let event = PeerEvent::Pong { addr, nonce, latency };
                                if events.send(event).await.is_err() {
                                    break ("node dispatcher gone".into(), false);
                                }
                            }
                            message => {
                                let event = PeerEvent::Message { addr, message };
                                if events.send(event).await.is_err() {
                                    break ("node dispatcher gone".into(), false);
                                }
                            }
                        }
                    }
                    Some(Err(error)) => {
                        // Malformed framing is a protocol violation.
                        warn!(%addr, %error, "codec error");
                        break (format!("codec error: {}", error), true);
                    }
                    None => break ("remote closed".into(), false),
                },

                _ = tick.tick() => {
                    if last_recv.elapsed() > TIMEOUT_INTERVAL {
                        break ("inactivity timeout".into(), false);
                    }
                    if last_send.elapsed() > PING_INTERVAL && pending_ping.is_none() {
                        let nonce = Nonce::random();
                        if self.framed.send(Message::Ping(nonce)).await.is_err() {
                            break ("ping send failed".into(), false);
                        }
                        last_send = Instant::now();
                        pending_ping = Some((nonce, Instant::now()));
                    }
                }
            }
        };

        self.peer.state = PeerState::Disconnecting;
        debug!(%addr, %reason, "peer disconnected");
        let _ = events
            .send(PeerEvent::Disconnected {
                addr,
                reason,
                misbehaved,
            })
            .await;
    }
}

async fn expect_version(
    framed: &mut Framed<TcpStream, Codec>,
    identity: &LocalIdentity,
) -> Result<Version, PeerError> {
    match framed.next().await {
        Some(Ok(Message::Version(version))) => {
            if version.version < MIN_PEER_VERSION {
                return Err(PeerError::ObsoleteVersion(version.version));
            }
            if version.nonce == identity.nonce {
                return Err(PeerError::SelfConnection);
            }
            Ok(version)
        }
        Some(Ok(message)) => Err(PeerError::UnexpectedHandshakeMessage {
            expected: "version",
            received: command_name(&message),
        }),
        Some(Err(error)) => Err(error.into()),
        None => Err(PeerError::RemoteClosed),
    }
}

async fn expect_verack(framed: &mut Framed<TcpStream, Codec>) -> Result<(), PeerError> {
    match framed.next().await {
        Some(Ok(Message::Verack)) => Ok(()),
        Some(Ok(message)) => Err(PeerError::UnexpectedHandshakeMessage {
            expected: "verack",
            received: command_name(&message),
        }),
        Some(Err(error)) => Err(error.into()),
        None => Err(PeerError::RemoteClosed),
    }
}

fn command_name(message: &Message) -> &'static str {
    message.command().name()
}
