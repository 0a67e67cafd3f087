//! In-memory mock transport for integration tests: a `send`/`recv` pair of
//! byte queues per handle, with optional scripted `send` failures so tests
//! can exercise the reactor's fatal-transport teardown path.

use std::collections::VecDeque;

use mqtt_embedded::error::Error;
use mqtt_embedded::transport::{Handle, ReadySet, SelectOutcome, TlsConfig, Transport, TransportError};

pub struct MockTransport {
    inbox: Vec<VecDeque<u8>>,
    outbox: Vec<Vec<u8>>,
    fail_send_on_call: Vec<Option<usize>>,
    send_calls: Vec<usize>,
    open: Vec<bool>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            inbox: Vec::new(),
            outbox: Vec::new(),
            fail_send_on_call: Vec::new(),
            send_calls: Vec::new(),
            open: Vec::new(),
        }
    }

    pub fn push_inbound(&mut self, handle: Handle, bytes: &[u8]) {
        self.inbox[handle.0 as usize].extend(bytes.iter().copied());
    }

    pub fn sent_bytes(&self, handle: Handle) -> &[u8] {
        &self.outbox[handle.0 as usize]
    }

    /// Make the `call_number`-th (1-based) `send` on `handle` return `Fatal`.
    pub fn fail_send_on_call(&mut self, handle: Handle, call_number: usize) {
        self.fail_send_on_call[handle.0 as usize] = Some(call_number);
    }

    pub fn is_closed(&self, handle: Handle) -> bool {
        !self.open[handle.0 as usize]
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn open(&mut self, _host: &str, _port: u16, _tls: Option<&TlsConfig>, _timeout_ms: u32) -> Result<Handle, Error> {
        let id = self.inbox.len() as u32;
        self.inbox.push(VecDeque::new());
        self.outbox.push(Vec::new());
        self.fail_send_on_call.push(None);
        self.send_calls.push(0);
        self.open.push(true);
        Ok(Handle(id))
    }

    fn configure(&mut self, _handle: Handle, _nodelay: bool, _keepalive_idle_s: Option<u32>) -> Result<(), Error> {
        Ok(())
    }

    fn close(&mut self, handle: Handle) {
        self.open[handle.0 as usize] = false;
    }

    fn send(&mut self, handle: Handle, buf: &[u8]) -> Result<usize, TransportError> {
        let idx = handle.0 as usize;
        self.send_calls[idx] += 1;
        if self.fail_send_on_call[idx] == Some(self.send_calls[idx]) {
            return Err(TransportError::Fatal);
        }
        self.outbox[idx].extend_from_slice(buf);
        Ok(buf.len())
    }

    fn recv(&mut self, handle: Handle, buf: &mut [u8]) -> Result<usize, TransportError> {
        let idx = handle.0 as usize;
        if self.inbox[idx].is_empty() {
            return Err(TransportError::WouldBlock);
        }
        let n = buf.len().min(self.inbox[idx].len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.inbox[idx].pop_front().expect("checked non-empty above");
        }
        Ok(n)
    }

    fn select(&mut self, read: &[Handle], write: &[Handle], _err: &[Handle], _timeout_ms: u32) -> Result<SelectOutcome, TransportError> {
        let mut set = ReadySet::new();
        for &h in read {
            let _ = set.readable.push(h);
        }
        for &h in write {
            let _ = set.writable.push(h);
        }
        Ok(SelectOutcome::Ready(set))
    }

    fn select_abort(&mut self, _handle: Handle) {}
}
