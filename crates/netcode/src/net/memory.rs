use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::transport::{ChannelFlags, ChannelKind, Payload, Transport, TransportError};

#[derive(Debug, Default)]
struct LinkState {
    sent: VecDeque<(ChannelKind, Payload)>,
    failing: ChannelFlags,
    closed: bool,
}

#[derive(Debug)]
pub struct MemoryTransport {
    state: Rc<RefCell<LinkState>>,
}

#[derive(Debug, Clone)]
pub struct MemoryHandle {
    state: Rc<RefCell<LinkState>>,
}

impl MemoryTransport {
    pub fn new() -> (MemoryTransport, MemoryHandle) {
        let state = Rc::new(RefCell::new(LinkState::default()));
        (
            MemoryTransport {
                state: Rc::clone(&state),
            },
            MemoryHandle { state },
        )
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, channel: ChannelKind, payload: &Payload) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(TransportError::Closed(channel));
        }
        if state.failing.contains(channel.flag()) {
            return Err(TransportError::Send(channel, "injected failure".to_string()));
        }
        state.sent.push_back((channel, payload.clone()));
        Ok(())
    }

    fn close(&mut self) {
        self.state.borrow_mut().closed = true;
    }
}

impl MemoryHandle {
    pub fn drain(&self) -> Vec<(ChannelKind, Payload)> {
        self.state.borrow_mut().sent.drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().sent.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn fail(&self, channel: ChannelKind) {
        self.state.borrow_mut().failing.insert(channel.flag());
    }

    pub fn texts(&self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|(_, p)| p.as_text().map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_queue_until_drained() {
        let (mut link, handle) = MemoryTransport::new();
        link.send(ChannelKind::Ordered, &Payload::Text("hello".into()))
            .unwrap();
        link.send(ChannelKind::Unreliable, &Payload::Binary(vec![1, 2]))
            .unwrap();
        assert_eq!(handle.pending(), 2);

        let frames = handle.drain();
        assert_eq!(frames[0].0, ChannelKind::Ordered);
        assert_eq!(frames[1].1, Payload::Binary(vec![1, 2]));
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn injected_failures_and_close() {
        let (mut link, handle) = MemoryTransport::new();
        handle.fail(ChannelKind::Reliable);
        assert!(link.send(ChannelKind::Reliable, &Payload::Text("x".into())).is_err());
        assert!(link.send(ChannelKind::Ordered, &Payload::Text("x".into())).is_ok());

        link.close();
        assert!(handle.is_closed());
        assert_eq!(
            link.send(ChannelKind::Ordered, &Payload::Text("x".into())),
            Err(TransportError::Closed(ChannelKind::Ordered))
        );
    }
}
