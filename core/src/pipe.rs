//! In-order message pipes
//!
//! Single-producer, single-consumer FIFOs. Entries are stored packed with
//! their header cached alongside, so peeking at the head costs nothing. A
//! peek or dequeue on an empty pipe is a caller bug and panics; callers must
//! check [`MessagePipe::is_idle`] first.
use std::collections::VecDeque;

use crate::control::{ControlRequest, ControlResponse, RequestKind, ResponseKind};
use crate::message::{NodeCommand, NodeFrame, NodeHeader};

/// One packed node-plane entry with its cached header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub header: NodeHeader,
    pub encoded: u64,
}

/// FIFO of 64-bit node-plane frames
#[derive(Debug, Default)]
pub struct MessagePipe {
    messages: VecDeque<Entry>,
}

impl MessagePipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all queued entries
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Append a message, packing it into its bit-exact frame
    pub fn enqueue<T: NodeFrame>(&mut self, message: &T) {
        self.messages.push_back(Entry {
            header: message.header(),
            encoded: message.pack(),
        });
    }

    /// Append an already-encoded entry (pass-through routing)
    pub fn enqueue_raw(&mut self, entry: Entry) {
        self.messages.push_back(entry);
    }

    /// True when no entries are queued
    pub fn is_idle(&self) -> bool {
        self.messages.is_empty()
    }

    /// Message type at the head of the queue
    pub fn next_type(&self) -> NodeCommand {
        self.peek().header.command
    }

    /// Header at the head of the queue
    pub fn next_header(&self) -> NodeHeader {
        self.peek().header
    }

    /// Retrieve and unpack the message at the head of the queue
    pub fn dequeue<T: NodeFrame>(&mut self) -> T {
        T::unpack(self.take().encoded)
    }

    /// Retrieve the head entry without decoding it
    pub fn dequeue_raw(&mut self) -> Entry {
        self.take()
    }

    fn peek(&self) -> &Entry {
        self.messages
            .front()
            .expect("peeked an empty message pipe")
    }

    fn take(&mut self) -> Entry {
        self.messages
            .pop_front()
            .expect("dequeued an empty message pipe")
    }
}

/// Cached head information for a control-plane entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Request(RequestKind),
    Response(ResponseKind),
}

/// One packed control-plane entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEntry {
    pub kind: ControlKind,
    pub encoded: u128,
}

/// FIFO of 128-bit control-plane frames
#[derive(Debug, Default)]
pub struct ControlPipe {
    messages: VecDeque<ControlEntry>,
}

impl ControlPipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn enqueue_request(&mut self, request: &ControlRequest) {
        self.messages.push_back(ControlEntry {
            kind: ControlKind::Request(request.kind()),
            encoded: request.pack(),
        });
    }

    pub fn enqueue_response(&mut self, response: &ControlResponse) {
        self.messages.push_back(ControlEntry {
            kind: ControlKind::Response(response.kind()),
            encoded: response.pack(),
        });
    }

    pub fn enqueue_raw(&mut self, entry: ControlEntry) {
        self.messages.push_back(entry);
    }

    pub fn is_idle(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn next_is_request(&self) -> bool {
        matches!(self.peek().kind, ControlKind::Request(_))
    }

    /// Request kind at the head of the queue
    ///
    /// Panics if the head holds a response; check
    /// [`ControlPipe::next_is_request`] first.
    pub fn next_request(&self) -> RequestKind {
        match self.peek().kind {
            ControlKind::Request(kind) => kind,
            ControlKind::Response(_) => panic!("peeked a response as a request"),
        }
    }

    /// Response kind at the head of the queue
    ///
    /// Panics if the head holds a request.
    pub fn next_response(&self) -> ResponseKind {
        match self.peek().kind {
            ControlKind::Response(kind) => kind,
            ControlKind::Request(_) => panic!("peeked a request as a response"),
        }
    }

    /// Dequeue and decode a request frame
    ///
    /// Panics if the head is a response; check [`ControlPipe::next_is_request`].
    pub fn dequeue_request(&mut self) -> ControlRequest {
        let entry = self.take();
        match entry.kind {
            ControlKind::Request(_) => ControlRequest::unpack(entry.encoded)
                .expect("request entry with invalid command bits"),
            ControlKind::Response(_) => panic!("dequeued a response as a request"),
        }
    }

    /// Dequeue and decode a response frame
    pub fn dequeue_response(&mut self) -> ControlResponse {
        let entry = self.take();
        match entry.kind {
            ControlKind::Response(_) => ControlResponse::unpack(entry.encoded)
                .expect("response entry with invalid format bits"),
            ControlKind::Request(_) => panic!("dequeued a request as a response"),
        }
    }

    pub fn dequeue_raw(&mut self) -> ControlEntry {
        self.take()
    }

    fn peek(&self) -> &ControlEntry {
        self.messages
            .front()
            .expect("peeked an empty control pipe")
    }

    fn take(&mut self) -> ControlEntry {
        self.messages
            .pop_front()
            .expect("dequeued an empty control pipe")
    }
}
