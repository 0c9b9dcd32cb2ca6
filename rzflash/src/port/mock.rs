//! Scripted in-memory device used by unit tests.
//!
//! Replies are queued by rules that fire, in order, when the host has written
//! a trigger: either a literal byte string or a number of payload bytes.

use crate::error::Result;
use crate::port::{DEFAULT_BAUD, Port};
use crate::protocol::reader::find_subslice;
use std::collections::VecDeque;
use std::io::{Read, Write};

pub(crate) enum Trigger {
    Text(Vec<u8>),
    Bytes(usize),
}

struct Rule {
    trigger: Trigger,
    reply: Vec<u8>,
    baud: Option<u32>,
}

pub(crate) struct MockPort {
    rx: VecDeque<u8>,
    written: Vec<u8>,
    scanned: usize,
    rules: VecDeque<Rule>,
    baud_rate: u32,
    baud_history: Vec<u32>,
    max_read: usize,
    clears: usize,
    refused_bauds: Vec<u32>,
}

impl MockPort {
    pub(crate) fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            written: Vec::new(),
            scanned: 0,
            rules: VecDeque::new(),
            baud_rate: DEFAULT_BAUD,
            baud_history: Vec::new(),
            max_read: usize::MAX,
            clears: 0,
            refused_bauds: Vec::new(),
        }
    }

    /// Bytes the device has already emitted before the host starts.
    pub(crate) fn with_output(mut self, bytes: &[u8]) -> Self {
        self.rx.extend(bytes);
        self
    }

    /// Limit each read to `n` bytes to exercise keywords split across reads.
    pub(crate) fn with_max_read(mut self, n: usize) -> Self {
        self.max_read = n;
        self
    }

    /// Fail any attempt to switch to `baud`, as a driver rejecting the rate.
    pub(crate) fn refuse_baud(mut self, baud: u32) -> Self {
        self.refused_bauds.push(baud);
        self
    }

    /// Reply with `reply` once the host has written `trigger`.
    pub(crate) fn on(mut self, trigger: &str, reply: &str) -> Self {
        self.rules.push_back(Rule {
            trigger: Trigger::Text(trigger.as_bytes().to_vec()),
            reply: reply.as_bytes().to_vec(),
            baud: None,
        });
        self
    }

    /// Like [`MockPort::on`], but only understood at baud rate `baud`.
    pub(crate) fn on_at(mut self, baud: u32, trigger: &str, reply: &str) -> Self {
        self.rules.push_back(Rule {
            trigger: Trigger::Text(trigger.as_bytes().to_vec()),
            reply: reply.as_bytes().to_vec(),
            baud: Some(baud),
        });
        self
    }

    /// Reply with `reply` once `n` more bytes have been written.
    pub(crate) fn after_bytes(mut self, n: usize, reply: &str) -> Self {
        self.rules.push_back(Rule {
            trigger: Trigger::Bytes(n),
            reply: reply.as_bytes().to_vec(),
            baud: None,
        });
        self
    }

    pub(crate) fn written(&self) -> &[u8] {
        &self.written
    }

    pub(crate) fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    pub(crate) fn baud_history(&self) -> &[u32] {
        &self.baud_history
    }

    pub(crate) fn clears(&self) -> usize {
        self.clears
    }

    pub(crate) fn pending_rules(&self) -> usize {
        self.rules.len()
    }

    fn fire_rules(&mut self) {
        while let Some(rule) = self.rules.front() {
            let fired_at = match &rule.trigger {
                Trigger::Text(text) => find_subslice(&self.written[self.scanned..], text)
                    .map(|pos| self.scanned + pos + text.len()),
                Trigger::Bytes(n) => {
                    (self.written.len() >= self.scanned + n).then(|| self.scanned + n)
                },
            };
            let Some(end) = fired_at else {
                break;
            };
            self.scanned = end;
            if let Some(rule) = self.rules.pop_front() {
                if rule.baud.is_none_or(|b| b == self.baud_rate) {
                    self.rx.extend(rule.reply);
                }
            }
        }
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.rx.len()).min(self.max_read);
        for slot in buf.iter_mut().take(n) {
            *slot = self.rx.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written.extend_from_slice(buf);
        self.fire_rules();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn bytes_to_read(&mut self) -> Result<usize> {
        Ok(self.rx.len().min(self.max_read))
    }

    fn clear_input(&mut self) -> Result<()> {
        self.rx.clear();
        self.clears += 1;
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        if self.refused_bauds.contains(&baud_rate) {
            return Err(std::io::Error::other(format!("cannot set {baud_rate} bps")).into());
        }
        self.baud_rate = baud_rate;
        self.baud_history.push(baud_rate);
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn name(&self) -> &str {
        "mock"
    }
}
