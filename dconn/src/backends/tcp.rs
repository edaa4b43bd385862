//! Software-progress, two-sided TCP backend.
//!
//! Each node binds one listening socket and publishes its port as a 2-byte
//! big-endian endpoint blob. Peers are reached by resolving their hostname
//! through the job topology. Every peer owns a [`BufferedIo`] engine for the
//! whole job; streams are attached to it on connect (this side) or accept
//! (the other side).

use dconn_common::config::{TcpConfig, TransportConfig};
use dconn_common::consts::TCP_ENDPOINT_LEN;
use dconn_common::io::{BufferedIo, IoEngine, PollInterest, Poller};
use dconn_common::topology::{JobTopology, NodeId};
use dconn_common::transport::{
    BackendEndpoint, ConnectionSemantics, DirectHeader, EndpointBlob, PeerLink, PollDescriptor,
    ProgressType, TransportBackend, TransportError,
};
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry name of this backend.
pub const NAME: &str = "tcp";

/// Factory registered under [`NAME`].
pub fn create_backend(
    config: &TransportConfig,
    topology: Arc<dyn JobTopology>,
) -> Box<dyn TransportBackend> {
    Box::new(TcpBackend::new(config.tcp.clone(), topology))
}

/// Encode a listening port as an endpoint blob.
pub fn encode_endpoint(port: u16) -> EndpointBlob {
    EndpointBlob::new(port.to_be_bytes().to_vec())
}

/// Decode a peer's endpoint blob into its listening port.
pub fn decode_endpoint(blob: &[u8]) -> Result<u16, TransportError> {
    let bytes: [u8; TCP_ENDPOINT_LEN] =
        blob.try_into().map_err(|_| TransportError::InvalidEndpoint {
            len: blob.len(),
            expected: TCP_ENDPOINT_LEN,
        })?;
    Ok(u16::from_be_bytes(bytes))
}

/// TCP transport backend.
pub struct TcpBackend {
    config: TcpConfig,
    topology: Arc<dyn JobTopology>,
    listener: Option<TcpListener>,
}

impl TcpBackend {
    /// Create an unprepared backend.
    pub fn new(config: TcpConfig, topology: Arc<dyn JobTopology>) -> Self {
        Self {
            config,
            topology,
            listener: None,
        }
    }
}

impl TransportBackend for TcpBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn progress_type(&self) -> ProgressType {
        ProgressType::Software
    }

    fn connection_semantics(&self) -> ConnectionSemantics {
        ConnectionSemantics::TwoSided
    }

    fn prepare(&mut self) -> Result<BackendEndpoint, TransportError> {
        let addr = (self.config.bind_addr.as_str(), self.config.port);
        let listener = TcpListener::bind(addr).map_err(|e| {
            TransportError::PollUnavailable(format!(
                "cannot listen on {}:{}: {}",
                self.config.bind_addr, self.config.port, e
            ))
        })?;
        let port = listener.local_addr()?.port();
        let fd = listener.as_raw_fd();
        info!("TCP direct connections listening on port {} (fd {})", port, fd);

        self.listener = Some(listener);
        Ok(BackendEndpoint {
            poll: PollDescriptor::Fd(fd),
            blob: encode_endpoint(port),
        })
    }

    fn init_peer(&self, node_id: NodeId, header: &DirectHeader) -> Box<dyn PeerLink> {
        Box::new(TcpPeer {
            node_id,
            topology: Arc::clone(&self.topology),
            engine: BufferedIo::new(*header),
        })
    }

    fn register_with_poller(&self, poller: &mut dyn Poller) -> Result<(), TransportError> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| TransportError::PollUnavailable("listener not bound".to_string()))?;
        poller.register(listener.as_raw_fd(), PollInterest::Accept)?;
        Ok(())
    }

    fn stop(&mut self) {
        if self.listener.take().is_some() {
            debug!("TCP listener closed");
        }
    }
}

/// Per-peer state of the TCP backend.
pub struct TcpPeer {
    node_id: NodeId,
    topology: Arc<dyn JobTopology>,
    engine: BufferedIo,
}

impl PeerLink for TcpPeer {
    fn connect(&mut self, endpoint: &[u8], init_msg: Option<&[u8]>) -> Result<(), TransportError> {
        let port = decode_endpoint(endpoint)?;
        let host = self
            .topology
            .job_host(self.node_id)
            .ok_or(TransportError::UnknownPeer(self.node_id))?;

        let stream = TcpStream::connect((host.as_str(), port))?;
        debug!("Connected to node {} at {}:{}", self.node_id, host, port);

        // The peer identifies us by the first message on the stream.
        if let Some(msg) = init_msg {
            self.engine.send_urgent(msg)?;
        }
        self.engine.attach(OwnedFd::from(stream))?;
        Ok(())
    }

    fn send(&mut self, msg: &[u8]) -> Result<(), TransportError> {
        self.engine.send_enqueue(msg)?;
        Ok(())
    }

    fn io_engine(&mut self) -> Option<&mut dyn IoEngine> {
        Some(&mut self.engine)
    }

    fn fini(&mut self) {
        drop(self.engine.detach());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dconn_common::topology::{JobStepId, StaticTopology};
    use std::os::fd::RawFd;

    fn topology(hosts: usize) -> Arc<dyn JobTopology> {
        Arc::new(StaticTopology::new(
            JobStepId {
                job_id: 7,
                step_id: 0,
            },
            0,
            vec!["127.0.0.1".to_string(); hosts],
        ))
    }

    fn loopback() -> TcpConfig {
        TcpConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
        }
    }

    struct RecordingPoller(Vec<(RawFd, PollInterest)>);

    impl Poller for RecordingPoller {
        fn register(&mut self, fd: RawFd, interest: PollInterest) -> std::io::Result<()> {
            self.0.push((fd, interest));
            Ok(())
        }
    }

    #[test]
    fn endpoint_encoding() {
        let blob = encode_endpoint(0x1234);
        assert_eq!(blob.as_bytes(), &[0x12, 0x34]);
        assert_eq!(decode_endpoint(blob.as_bytes()).unwrap(), 0x1234);
    }

    #[test]
    fn endpoint_rejects_wrong_length() {
        let err = decode_endpoint(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            TransportError::InvalidEndpoint {
                len: 3,
                expected: 2
            }
        ));
    }

    #[test]
    fn prepare_publishes_listener_port() {
        let mut backend = TcpBackend::new(loopback(), topology(1));
        let ep = backend.prepare().unwrap();
        let port = decode_endpoint(ep.blob.as_bytes()).unwrap();
        assert_ne!(port, 0);
        assert!(ep.poll.fd().is_some());

        let mut poller = RecordingPoller(Vec::new());
        backend.register_with_poller(&mut poller).unwrap();
        assert_eq!(poller.0, vec![(ep.poll.fd().unwrap(), PollInterest::Accept)]);
    }

    #[test]
    fn prepare_fails_when_port_is_taken() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = TcpConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: taken.local_addr().unwrap().port(),
        };
        let mut backend = TcpBackend::new(config, topology(1));
        assert!(matches!(
            backend.prepare(),
            Err(TransportError::PollUnavailable(_))
        ));
    }

    #[test]
    fn register_before_prepare_fails() {
        let backend = TcpBackend::new(loopback(), topology(1));
        let mut poller = RecordingPoller(Vec::new());
        assert!(backend.register_with_poller(&mut poller).is_err());
    }

    #[test]
    fn connect_sends_init_message_first() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let backend = TcpBackend::new(loopback(), topology(2));
        let header = DirectHeader::length_prefixed();
        let mut peer = backend.init_peer(1, &header);
        let init = DirectHeader::frame(b"hello from 0");
        peer.connect(encode_endpoint(port).as_bytes(), Some(init.as_slice()))
            .unwrap();
        peer.send(&DirectHeader::frame(b"second")).unwrap();

        let (stream, _) = listener.accept().unwrap();
        let mut rx = BufferedIo::new(header);
        rx.attach(stream.into()).unwrap();
        assert_eq!(&rx.recv_message().unwrap().unwrap()[4..], b"hello from 0");
        assert_eq!(&rx.recv_message().unwrap().unwrap()[4..], b"second");
    }

    #[test]
    fn init_message_precedes_queued_sends() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let backend = TcpBackend::new(loopback(), topology(2));
        let header = DirectHeader::length_prefixed();
        let mut peer = backend.init_peer(1, &header);
        peer.send(&DirectHeader::frame(b"queued")).unwrap();
        let init = DirectHeader::frame(b"INIT");
        peer.connect(encode_endpoint(port).as_bytes(), Some(init.as_slice()))
            .unwrap();

        let (stream, _) = listener.accept().unwrap();
        let mut rx = BufferedIo::new(header);
        rx.attach(stream.into()).unwrap();
        assert_eq!(&rx.recv_message().unwrap().unwrap()[4..], b"INIT");
        assert_eq!(&rx.recv_message().unwrap().unwrap()[4..], b"queued");
    }

    #[test]
    fn reconnect_does_not_replay_old_queue() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let backend = TcpBackend::new(loopback(), topology(2));
        let header = DirectHeader::length_prefixed();
        let mut peer = backend.init_peer(1, &header);

        peer.send(&DirectHeader::frame(b"stale")).unwrap();
        drop(peer.io_engine().unwrap().detach());

        let init = DirectHeader::frame(b"INIT");
        peer.connect(encode_endpoint(port).as_bytes(), Some(init.as_slice()))
            .unwrap();
        peer.send(&DirectHeader::frame(b"fresh")).unwrap();

        let (stream, _) = listener.accept().unwrap();
        let mut rx = BufferedIo::new(header);
        rx.attach(stream.into()).unwrap();
        assert_eq!(&rx.recv_message().unwrap().unwrap()[4..], b"INIT");
        assert_eq!(&rx.recv_message().unwrap().unwrap()[4..], b"fresh");
    }

    #[test]
    fn connect_refused_is_an_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let backend = TcpBackend::new(loopback(), topology(2));
        let mut peer = backend.init_peer(1, &DirectHeader::length_prefixed());
        let init = DirectHeader::frame(b"INIT");
        let err = peer
            .connect(&port.to_be_bytes(), Some(init.as_slice()))
            .unwrap_err();
        assert!(matches!(err, TransportError::Io { .. }));
        assert!(!peer.io_engine().unwrap().is_attached());
    }

    #[test]
    fn connect_to_unknown_peer_fails() {
        let backend = TcpBackend::new(loopback(), topology(1));
        let mut peer = backend.init_peer(5, &DirectHeader::length_prefixed());
        let err = peer.connect(&[0, 1], None).unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer(5)));
    }

    #[test]
    fn fini_detaches_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let backend = TcpBackend::new(loopback(), topology(2));
        let mut peer = backend.init_peer(1, &DirectHeader::length_prefixed());
        peer.connect(&port.to_be_bytes(), None).unwrap();
        assert!(peer.io_engine().unwrap().is_attached());
        peer.fini();
        assert!(!peer.io_engine().unwrap().is_attached());
    }
}
