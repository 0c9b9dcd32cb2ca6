//! Keyword-synchronized reader.
//!
//! SCIF output has no framing, so the only way to know where the device is
//! in a conversation is to watch for literal phrases. The reader accumulates
//! everything it reads into a sliding window and reports when a keyword
//! appears in it. A keyword split across several reads, or surrounded by
//! unrelated banner text, still matches.
//!
//! Matching consumes the window up to the end of the match, so a keyword that
//! is awaited twice (the `>` prompt, typically) needs a fresh occurrence.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event::{Event, EventSink};
use crate::port::Port;
use crate::protocol::keywords::LONGEST_KEYWORD;
use log::trace;
use std::time::Duration;

/// Default interval between polls of the port.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default size of the receive window.
pub const DEFAULT_WINDOW: usize = 4096;

/// Find the first occurrence of `needle` in `haystack`.
pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

/// Sliding receive window with keyword matching.
#[derive(Debug, Clone)]
pub struct KeywordReader {
    window: Vec<u8>,
    capacity: usize,
    poll_interval: Duration,
}

impl Default for KeywordReader {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_POLL_INTERVAL)
    }
}

impl KeywordReader {
    /// Create a reader. `capacity` is raised to twice the longest known keyword if smaller.
    pub fn new(capacity: usize, poll_interval: Duration) -> Self {
        Self {
            window: Vec::new(),
            capacity: capacity.max(2 * LONGEST_KEYWORD),
            poll_interval,
        }
    }

    /// Poll interval in use.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Bytes currently held in the window.
    pub fn window(&self) -> &[u8] {
        &self.window
    }

    /// Last `n` bytes of the window, lossily decoded, for diagnostics.
    pub fn tail(&self, n: usize) -> String {
        let start = self.window.len().saturating_sub(n);
        String::from_utf8_lossy(&self.window[start..]).into_owned()
    }

    /// Wait until `keyword` appears or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout; whether that is fatal is up to the caller.
    pub fn wait_for<P: Port + ?Sized>(
        &mut self,
        port: &mut P,
        clock: &dyn Clock,
        sink: &mut dyn EventSink,
        keyword: &[u8],
        timeout: Duration,
    ) -> Result<bool> {
        trace!(
            "Waiting for {:?} (timeout: {:?})",
            String::from_utf8_lossy(keyword),
            timeout
        );
        let start = clock.now();

        // Leftovers from a previous read may already hold the keyword.
        if self.consume_match(keyword) {
            sink.emit(&Event::KeywordMatched {
                keyword: String::from_utf8_lossy(keyword).into_owned(),
                waited: Duration::ZERO,
            });
            return Ok(true);
        }

        loop {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            let data = port.read_available()?;
            if !data.is_empty() {
                sink.emit(&Event::Received(data.clone()));
                self.push(&data, keyword.len());
                if self.consume_match(keyword) {
                    sink.emit(&Event::KeywordMatched {
                        keyword: String::from_utf8_lossy(keyword).into_owned(),
                        waited: clock.since(start),
                    });
                    return Ok(true);
                }
            }

            if clock.since(start) >= timeout {
                return Ok(false);
            }
            clock.sleep(self.poll_interval);
        }
    }

    /// Collect whatever arrives during `duration`. The window is left untouched.
    pub fn read_for<P: Port + ?Sized>(
        &mut self,
        port: &mut P,
        clock: &dyn Clock,
        sink: &mut dyn EventSink,
        duration: Duration,
    ) -> Result<Vec<u8>> {
        let start = clock.now();
        let mut out = Vec::new();

        loop {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }
            let data = port.read_available()?;
            if !data.is_empty() {
                sink.emit(&Event::Received(data.clone()));
                out.extend_from_slice(&data);
            }
            if clock.since(start) >= duration {
                return Ok(out);
            }
            clock.sleep(self.poll_interval);
        }
    }

    /// Drop transport-buffered input and the window.
    pub fn flush_input<P: Port + ?Sized>(&mut self, port: &mut P) -> Result<()> {
        port.clear_input()?;
        self.window.clear();
        Ok(())
    }

    fn push(&mut self, data: &[u8], keyword_len: usize) {
        self.window.extend_from_slice(data);
        let limit = self.capacity.max(2 * keyword_len);
        if self.window.len() > limit {
            let excess = self.window.len() - limit;
            self.window.drain(..excess);
        }
    }

    fn consume_match(&mut self, keyword: &[u8]) -> bool {
        match find_subslice(&self.window, keyword) {
            Some(pos) => {
                self.window.drain(..pos + keyword.len());
                true
            },
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::virtual_clock::VirtualClock;
    use crate::port::mock::MockPort;

    fn no_events() -> impl FnMut(&Event) {
        |_: &Event| {}
    }

    #[test]
    fn test_find_subslice() {
        assert_eq!(find_subslice(b"abc>def", b">"), Some(3));
        assert_eq!(find_subslice(b"abc", b"abcd"), None);
        assert_eq!(find_subslice(b"abc", b""), Some(0));
    }

    #[test]
    fn test_keyword_found_among_banner_text() {
        let mut port = MockPort::new().with_output(b"\r\nSCIF Download mode\r\n (C) Renesas\r\n");
        let clock = VirtualClock::new();
        let mut reader = KeywordReader::default();

        let found = reader
            .wait_for(
                &mut port,
                &clock,
                &mut no_events(),
                b"SCIF Download mode",
                Duration::from_secs(1),
            )
            .unwrap();
        assert!(found);
    }

    #[test]
    fn test_keyword_split_across_reads() {
        let mut port = MockPort::new()
            .with_output(b"xx Program Top Address : ")
            .with_max_read(3);
        let clock = VirtualClock::new();
        let mut reader = KeywordReader::default();

        let found = reader
            .wait_for(
                &mut port,
                &clock,
                &mut no_events(),
                b"Program Top Address",
                Duration::from_secs(5),
            )
            .unwrap();
        assert!(found);
        // Several polls were needed, each sleeping one interval.
        assert!(clock.now() >= DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_timeout_returns_false() {
        let mut port = MockPort::new().with_output(b"nothing useful");
        let clock = VirtualClock::new();
        let mut reader = KeywordReader::default();

        let found = reader
            .wait_for(&mut port, &clock, &mut no_events(), b">", Duration::from_secs(3))
            .unwrap();
        assert!(!found);
        assert!(clock.now() >= Duration::from_secs(3));
        assert_eq!(reader.tail(6), "useful");
    }

    #[test]
    fn test_match_consumes_window() {
        let mut port = MockPort::new().with_output(b"> >");
        let clock = VirtualClock::new();
        let mut reader = KeywordReader::default();
        let timeout = Duration::from_secs(1);

        assert!(reader.wait_for(&mut port, &clock, &mut no_events(), b">", timeout).unwrap());
        assert!(reader.wait_for(&mut port, &clock, &mut no_events(), b">", timeout).unwrap());
        assert!(!reader.wait_for(&mut port, &clock, &mut no_events(), b">", timeout).unwrap());
    }

    #[test]
    fn test_window_is_bounded() {
        let noise = vec![b'.'; 10_000];
        let mut port = MockPort::new().with_output(&noise);
        let clock = VirtualClock::new();
        let mut reader = KeywordReader::new(128, DEFAULT_POLL_INTERVAL);

        let found = reader
            .wait_for(&mut port, &clock, &mut no_events(), b"Complete!", Duration::from_millis(200))
            .unwrap();
        assert!(!found);
        assert_eq!(reader.window().len(), 128);
    }

    #[test]
    fn test_capacity_never_below_keyword_size() {
        let reader = KeywordReader::new(1, DEFAULT_POLL_INTERVAL);
        assert_eq!(reader.capacity, 2 * LONGEST_KEYWORD);
    }

    #[test]
    fn test_received_bytes_are_echoed_to_sink() {
        let mut port = MockPort::new().with_output(b"hello>");
        let clock = VirtualClock::new();
        let mut reader = KeywordReader::default();
        let mut received = Vec::new();

        {
            let mut sink = |e: &Event| {
                if let Event::Received(bytes) = e {
                    received.extend_from_slice(bytes);
                }
            };
            reader
                .wait_for(&mut port, &clock, &mut sink, b">", Duration::from_secs(1))
                .unwrap();
        }
        assert_eq!(received, b"hello>");
    }

    #[test]
    fn test_read_for_drains_without_touching_window() {
        let mut port = MockPort::new().with_output(b"stale output");
        let clock = VirtualClock::new();
        let mut reader = KeywordReader::default();

        let data = reader
            .read_for(&mut port, &clock, &mut no_events(), Duration::from_millis(300))
            .unwrap();
        assert_eq!(data, b"stale output");
        assert!(reader.window().is_empty());
    }

    #[test]
    fn test_flush_input_clears_port_and_window() {
        let mut port = MockPort::new().with_output(b"abc");
        let clock = VirtualClock::new();
        let mut reader = KeywordReader::default();
        let _ = reader
            .wait_for(&mut port, &clock, &mut no_events(), b"zzz", Duration::ZERO)
            .unwrap();
        assert!(!reader.window().is_empty());

        reader.flush_input(&mut port).unwrap();
        assert!(reader.window().is_empty());
        assert_eq!(port.clears(), 1);
    }
}
