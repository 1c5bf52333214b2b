//! Scriptable collaborators for server tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use crate::core::{
    ConnectionId, DatagramLink, LinkError, LinkFactory, LinkState, PeerId, PeerInfo,
    RelayConnection, RelaySocket, SendMode, SendResult, SocketEvent,
};

#[derive(Debug)]
pub struct ConnectionLog {
    pub accepts: u32,
    pub sent: Vec<(Vec<u8>, SendMode)>,
    pub closes: u32,
    pub accept_result: SendResult,
    pub send_result: SendResult,
}

impl Default for ConnectionLog {
    fn default() -> Self {
        Self {
            accepts: 0,
            sent: Vec::new(),
            closes: 0,
            accept_result: SendResult::Ok,
            send_result: SendResult::Ok,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockConnection {
    pub id: ConnectionId,
    pub log: Rc<RefCell<ConnectionLog>>,
}

impl MockConnection {
    pub fn new(id: u32) -> Self {
        Self {
            id: ConnectionId::new(id),
            log: Rc::default(),
        }
    }
}

impl RelayConnection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn accept(&mut self) -> SendResult {
        let mut log = self.log.borrow_mut();
        log.accepts += 1;
        log.accept_result
    }

    fn send(&mut self, frame: &[u8], mode: SendMode) -> SendResult {
        let mut log = self.log.borrow_mut();
        if log.send_result.is_ok() {
            log.sent.push((frame.to_vec(), mode));
        }
        log.send_result
    }

    fn close(&mut self) -> bool {
        self.log.borrow_mut().closes += 1;
        true
    }
}

#[derive(Debug, Default)]
pub struct LinkLog {
    pub endpoint: Option<SocketAddr>,
    pub sent: Vec<Vec<u8>>,
    pub incoming: VecDeque<Vec<u8>>,
    pub fail_receive: bool,
    pub fail_send: bool,
    pub closes: u32,
}

#[derive(Debug)]
pub struct MockLink {
    pub log: Rc<RefCell<LinkLog>>,
}

impl DatagramLink for MockLink {
    fn state(&self) -> LinkState {
        if self.log.borrow().closes > 0 {
            LinkState::Closed
        } else {
            LinkState::Open
        }
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let mut log = self.log.borrow_mut();
        if log.fail_send {
            return Err(LinkError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        log.sent.push(payload.to_vec());
        Ok(())
    }

    fn receive(&mut self, out: &mut Vec<Vec<u8>>) -> Result<usize, LinkError> {
        let mut log = self.log.borrow_mut();
        if log.fail_receive {
            // A partial batch may already be in `out` when the link fails.
            out.extend(log.incoming.drain(..));
            return Err(LinkError::Disconnected("port unreachable".into()));
        }
        let count = log.incoming.len();
        out.extend(log.incoming.drain(..));
        Ok(count)
    }

    fn close(&mut self) {
        self.log.borrow_mut().closes += 1;
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockLinkFactory {
    pub opened: Rc<RefCell<Vec<Rc<RefCell<LinkLog>>>>>,
    pub fail: Rc<Cell<bool>>,
}

impl MockLinkFactory {
    pub fn link(&self, index: usize) -> Rc<RefCell<LinkLog>> {
        Rc::clone(&self.opened.borrow()[index])
    }

    pub fn opened_count(&self) -> usize {
        self.opened.borrow().len()
    }
}

impl LinkFactory for MockLinkFactory {
    type Link = MockLink;

    fn open(&mut self, endpoint: SocketAddr) -> Result<MockLink, LinkError> {
        if self.fail.get() {
            return Err(LinkError::Io(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no local ports",
            )));
        }
        let log = Rc::new(RefCell::new(LinkLog {
            endpoint: Some(endpoint),
            ..LinkLog::default()
        }));
        self.opened.borrow_mut().push(Rc::clone(&log));
        Ok(MockLink { log })
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockSocket {
    pub script: Rc<RefCell<VecDeque<SocketEvent<MockConnection>>>>,
    pub invalid: Rc<Cell<bool>>,
    pub closes: Rc<Cell<u32>>,
}

impl MockSocket {
    /// Script a connecting peer and return its connection log.
    pub fn connecting(&self, id: u32, peer: u64) -> Rc<RefCell<ConnectionLog>> {
        let connection = MockConnection::new(id);
        let log = Rc::clone(&connection.log);
        self.push(SocketEvent::Connecting {
            connection,
            info: PeerInfo::new(PeerId::new(peer)),
        });
        log
    }

    pub fn message(&self, id: u32, data: Vec<u8>) {
        self.push(SocketEvent::Message {
            id: ConnectionId::new(id),
            data,
        });
    }

    pub fn push(&self, event: SocketEvent<MockConnection>) {
        self.script.borrow_mut().push_back(event);
    }
}

impl RelaySocket for MockSocket {
    type Connection = MockConnection;

    fn is_valid(&self) -> bool {
        !self.invalid.get()
    }

    fn receive(&mut self, events: &mut Vec<SocketEvent<MockConnection>>) {
        events.extend(self.script.borrow_mut().drain(..));
    }

    fn close(&mut self) {
        self.closes.set(self.closes.get() + 1);
    }
}
