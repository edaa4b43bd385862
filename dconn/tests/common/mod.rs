//! Shared fixtures for dconn integration tests: a scriptable backend that
//! records every call, a recording job terminator and a recording poller.

#![allow(dead_code)]

use dconn::{BackendRegistry, DirectConnManager};
use dconn_common::config::{TcpConfig, TransportConfig};
use dconn_common::io::{IoEngine, PollInterest, Poller};
use dconn_common::termination::{JobTerminator, TerminateError};
use dconn_common::topology::{JobStepId, JobTopology, NodeId, StaticTopology};
use dconn_common::transport::{
    BackendEndpoint, ConnectionSemantics, DirectHeader, EndpointBlob, PeerLink, PollDescriptor,
    ProgressType, TransportBackend, TransportError,
};
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::net::TcpListener;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::sync::Arc;

/// Job/step used by every fixture topology.
pub const STEP: JobStepId = JobStepId {
    job_id: 42,
    step_id: 1,
};

/// Poll descriptor reported by software-progress mocks.
pub const MOCK_POLL_FD: RawFd = 77;

/// One observed backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    InitPeer(NodeId),
    Connect {
        node_id: NodeId,
        endpoint: Vec<u8>,
        init_msg: Option<Vec<u8>>,
    },
    Send(NodeId, Vec<u8>),
    Attach(NodeId),
    Detach(NodeId),
    Fini(NodeId),
    Register(RawFd, PollInterest),
    Stop,
    Finalize,
}

/// Shared call log.
pub type EventLog = Arc<Mutex<Vec<Event>>>;

/// Scriptable backend.
pub struct MockBackend {
    pub progress: ProgressType,
    pub semantics: ConnectionSemantics,
    pub fail_prepare: bool,
    pub unreachable: HashSet<NodeId>,
    pub events: EventLog,
}

impl MockBackend {
    /// Software-progress, two-sided backend (TCP-like).
    pub fn software() -> Self {
        Self {
            progress: ProgressType::Software,
            semantics: ConnectionSemantics::TwoSided,
            fail_prepare: false,
            unreachable: HashSet::new(),
            events: Arc::default(),
        }
    }

    /// Hardware-progress, one-sided backend (RDMA-like).
    pub fn hardware() -> Self {
        Self {
            progress: ProgressType::Hardware,
            semantics: ConnectionSemantics::OneSided,
            ..Self::software()
        }
    }

    /// Connecting to `node_id` fails.
    pub fn unreachable(mut self, node_id: NodeId) -> Self {
        self.unreachable.insert(node_id);
        self
    }
}

impl TransportBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn progress_type(&self) -> ProgressType {
        self.progress
    }

    fn connection_semantics(&self) -> ConnectionSemantics {
        self.semantics
    }

    fn prepare(&mut self) -> Result<BackendEndpoint, TransportError> {
        if self.fail_prepare {
            return Err(TransportError::PollUnavailable("mock".to_string()));
        }
        let poll = match self.progress {
            ProgressType::Software => PollDescriptor::Fd(MOCK_POLL_FD),
            ProgressType::Hardware => PollDescriptor::NotRequired,
        };
        Ok(BackendEndpoint {
            poll,
            blob: EndpointBlob::new(vec![0xde, 0xad]),
        })
    }

    fn init_peer(&self, node_id: NodeId, _header: &DirectHeader) -> Box<dyn PeerLink> {
        self.events.lock().push(Event::InitPeer(node_id));
        let engine = (self.progress == ProgressType::Software).then(|| MockEngine {
            node_id,
            fd: None,
            events: Arc::clone(&self.events),
        });
        Box::new(MockLink {
            node_id,
            unreachable: self.unreachable.contains(&node_id),
            engine,
            events: Arc::clone(&self.events),
        })
    }

    fn register_with_poller(&self, poller: &mut dyn Poller) -> Result<(), TransportError> {
        if self.progress == ProgressType::Software {
            poller.register(MOCK_POLL_FD, PollInterest::Accept)?;
            self.events
                .lock()
                .push(Event::Register(MOCK_POLL_FD, PollInterest::Accept));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.events.lock().push(Event::Stop);
    }

    fn finalize(&mut self) {
        self.events.lock().push(Event::Finalize);
    }
}

/// Per-peer state of [`MockBackend`].
pub struct MockLink {
    node_id: NodeId,
    unreachable: bool,
    engine: Option<MockEngine>,
    events: EventLog,
}

impl PeerLink for MockLink {
    fn connect(&mut self, endpoint: &[u8], init_msg: Option<&[u8]>) -> Result<(), TransportError> {
        self.events.lock().push(Event::Connect {
            node_id: self.node_id,
            endpoint: endpoint.to_vec(),
            init_msg: init_msg.map(<[u8]>::to_vec),
        });
        if self.unreachable {
            return Err(TransportError::Backend("connection refused".to_string()));
        }
        Ok(())
    }

    fn send(&mut self, msg: &[u8]) -> Result<(), TransportError> {
        if self.unreachable {
            return Err(TransportError::NotConnected(self.node_id));
        }
        self.events.lock().push(Event::Send(self.node_id, msg.to_vec()));
        Ok(())
    }

    fn io_engine(&mut self) -> Option<&mut dyn IoEngine> {
        self.engine.as_mut().map(|e| e as &mut dyn IoEngine)
    }

    fn fini(&mut self) {
        self.events.lock().push(Event::Fini(self.node_id));
    }
}

/// I/O engine that only holds the descriptor.
pub struct MockEngine {
    node_id: NodeId,
    fd: Option<OwnedFd>,
    events: EventLog,
}

impl IoEngine for MockEngine {
    fn attach(&mut self, fd: OwnedFd) -> io::Result<()> {
        self.events.lock().push(Event::Attach(self.node_id));
        self.fd = Some(fd);
        Ok(())
    }

    fn detach(&mut self) -> Option<OwnedFd> {
        self.events.lock().push(Event::Detach(self.node_id));
        self.fd.take()
    }

    fn is_attached(&self) -> bool {
        self.fd.is_some()
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(|fd| fd.as_raw_fd())
    }

    fn send_enqueue(&mut self, _msg: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn send_urgent(&mut self, _msg: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn recv_message(&mut self) -> io::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Terminator that records every kill request.
#[derive(Default)]
pub struct RecordingTerminator {
    pub calls: Mutex<Vec<(JobStepId, Signal)>>,
}

impl JobTerminator for RecordingTerminator {
    fn kill_job_step(&self, step: JobStepId, signal: Signal) -> Result<(), TerminateError> {
        self.calls.lock().push((step, signal));
        Ok(())
    }
}

/// Poller that records registrations.
#[derive(Default)]
pub struct RecordingPoller {
    pub registered: Vec<(RawFd, PollInterest)>,
}

impl Poller for RecordingPoller {
    fn register(&mut self, fd: RawFd, interest: PollInterest) -> io::Result<()> {
        self.registered.push((fd, interest));
        Ok(())
    }
}

/// Topology of `hosts` nodes named `node0..`, seen from `node_id`.
pub fn topology(node_id: NodeId, hosts: usize) -> Arc<dyn JobTopology> {
    let hosts = (0..hosts).map(|i| format!("node{i}")).collect();
    Arc::new(StaticTopology::new(STEP, node_id, hosts))
}

/// Manager for a 4-node job seen from `node_id`.
pub fn manager(node_id: NodeId, backend: MockBackend) -> DirectConnManager {
    DirectConnManager::initialize(
        Box::new(backend),
        topology(node_id, 4),
        4,
        &DirectHeader::length_prefixed(),
    )
    .expect("initialize")
}

/// Manager of a 2-node loopback job on the built-in TCP backend.
pub fn tcp_manager(node_id: NodeId) -> DirectConnManager {
    let topology: Arc<dyn JobTopology> = Arc::new(StaticTopology::new(
        STEP,
        node_id,
        vec!["127.0.0.1".to_string(); 2],
    ));
    let config = TransportConfig {
        tcp: TcpConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
        },
        ..TransportConfig::default()
    };
    let backend = BackendRegistry::with_builtin()
        .select(&config, Arc::clone(&topology))
        .expect("tcp backend");
    DirectConnManager::initialize(backend, topology, 2, &DirectHeader::length_prefixed())
        .expect("initialize")
}

/// Duplicate of the listening socket behind a manager's poll descriptor.
pub fn listener_of(manager: &DirectConnManager) -> TcpListener {
    let fd = manager.poll_descriptor().fd().expect("listener fd");
    // SAFETY: the manager keeps the listener open for the duration of the borrow.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    TcpListener::from(borrowed.try_clone_to_owned().expect("dup listener"))
}

/// Connected TCP pair over loopback: (client, server).
pub fn tcp_pair() -> (std::net::TcpStream, std::net::TcpStream) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let client = std::net::TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    (client, server)
}
