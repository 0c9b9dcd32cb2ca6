//! UART speed negotiation with Flash Writer.
//!
//! The device announces the new rate and switches right after; the host
//! follows, drops whatever it received at the old rate, and probes with `H`.
//! If the probe is not answered the host goes back to the rate it started
//! from, so the session never ends up at a rate nobody verified.

use super::ScifSession;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::port::{Port, SUPPORTED_BAUDS};
use crate::protocol::keywords::{PROMPT, speed_change_request};
use log::{error, info, warn};
use std::time::Duration;

/// Delays used by [`ScifSession::negotiate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedTiming {
    /// How long to wait for the "please change" phrase.
    pub request_timeout: Duration,
    /// Time the device needs to switch after announcing it.
    pub device_settle: Duration,
    /// Time the host driver needs after a rate change.
    pub host_settle: Duration,
    /// How long to wait for the prompt after the `H` probe.
    pub probe_timeout: Duration,
}

impl Default for SpeedTiming {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
            device_settle: Duration::from_secs(2),
            host_settle: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

impl<P: Port> ScifSession<P> {
    /// Move both ends of the link to `target` bps.
    ///
    /// Returns `Ok(true)` once the new rate is verified (or was already in
    /// use) and `Ok(false)` if the device never asked for the change, in which
    /// case nothing was switched.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for a rate Flash Writer does not offer,
    /// [`Error::Verification`] when the probe at the new rate failed and the
    /// host went back to its original rate, and [`Error::RollbackFailed`]
    /// when the port refused the original rate again.
    pub fn negotiate(&mut self, target: u32) -> Result<bool> {
        if !SUPPORTED_BAUDS.contains(&target) {
            return Err(Error::Config(format!(
                "unsupported baud rate {target} (supported: {SUPPORTED_BAUDS:?})"
            )));
        }
        let original = self.baud_rate();
        if original == target {
            info!("Already at {target} bps");
            return Ok(true);
        }
        let request = speed_change_request(target)
            .ok_or_else(|| Error::Config(format!("no speed change phrase for {target}")))?;
        let timing = self.speed_timing;

        info!("Requesting UART speed change {original} -> {target} bps");
        self.send_line("SUP")?;
        if !self.wait_for(request, timing.request_timeout)? {
            warn!("Device did not accept the speed change, staying at {original} bps");
            return Ok(false);
        }

        self.sleep(timing.device_settle);
        match self.switch_and_probe(target, timing) {
            Ok(true) => {
                info!("UART speed changed to {target} bps");
                self.emit(&Event::SpeedChanged {
                    from: original,
                    to: target,
                });
                Ok(true)
            },
            verdict => {
                if let Err(e) = self.port_mut().set_baud_rate(original) {
                    error!("Could not return to {original} bps after unconfirmed switch: {e}");
                    return Err(Error::RollbackFailed {
                        from: original,
                        to: target,
                        reason: e.to_string(),
                    });
                }
                self.sleep(timing.host_settle);
                warn!("No response at {target} bps, reverted to {original} bps");
                self.emit(&Event::SpeedRolledBack {
                    from: original,
                    to: target,
                });
                match verdict {
                    Err(Error::Interrupted) => Err(Error::Interrupted),
                    _ => Err(Error::Verification {
                        from: original,
                        to: target,
                    }),
                }
            },
        }
    }

    fn switch_and_probe(&mut self, target: u32, timing: SpeedTiming) -> Result<bool> {
        self.port_mut().set_baud_rate(target)?;
        self.sleep(timing.host_settle);
        // Anything still buffered was received at the old rate.
        self.flush_input()?;
        self.send_line("H")?;
        self.wait_for(PROMPT, timing.probe_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::session;
    use super::*;
    use crate::port::mock::MockPort;

    const FAST: u32 = 921_600;
    const SLOW: u32 = 115_200;

    fn help_text() -> &'static str {
        "\r\n SUP  Scif speed UP (Change to speed up baud rate setting)\r\n H    help\r\n>"
    }

    #[test]
    fn test_unsupported_rate() {
        let mut s = session(MockPort::new());
        assert!(matches!(s.negotiate(460_800), Err(Error::Config(_))));
        assert!(s.port().written().is_empty());
    }

    #[test]
    fn test_same_rate_is_noop() {
        let mut s = session(MockPort::new());
        assert!(s.negotiate(SLOW).unwrap());
        assert!(s.port().written().is_empty());
        assert!(s.port().baud_history().is_empty());
    }

    #[test]
    fn test_speed_up_verified() {
        let port = MockPort::new()
            .on("SUP\r\n", "Scif speed UP\r\nPlease change to 921.6Kbps baud rate setting of the terminal.")
            .on_at(FAST, "H\r\n", help_text());
        let mut s = session(port);

        assert!(s.negotiate(FAST).unwrap());
        assert_eq!(s.baud_rate(), FAST);
        assert_eq!(s.port().baud_history(), &[FAST]);
        assert_eq!(s.port().written(), b"SUP\r\nH\r\n");
    }

    #[test]
    fn test_refused_request_leaves_rate() {
        let port = MockPort::new().on("SUP\r\n", "command error\r\n>");
        let mut s = session(port);

        assert!(!s.negotiate(FAST).unwrap());
        assert_eq!(s.baud_rate(), SLOW);
        assert!(s.port().baud_history().is_empty());
    }

    #[test]
    fn test_failed_probe_rolls_back() {
        // The device answers H only at the old rate, so the probe at 921600 fails.
        let port = MockPort::new()
            .on("SUP\r\n", "Please change to 921.6Kbps baud rate")
            .on_at(SLOW, "H\r\n", help_text());
        let mut s = session(port);

        let err = s.negotiate(FAST).unwrap_err();
        assert!(matches!(err, Error::Verification { from: SLOW, to: FAST }));
        assert_eq!(s.baud_rate(), SLOW);
        assert_eq!(s.port().baud_history(), &[FAST, SLOW]);
    }

    #[test]
    fn test_prompt_before_switch_does_not_verify() {
        // The prompt after the phrase arrives at the old rate; only an answer
        // at 921600 may confirm the change.
        let port = MockPort::new().on(
            "SUP\r\n",
            "Please change to 921.6Kbps baud rate setting of the terminal.\r\n>",
        );
        let mut s = session(port);

        let err = s.negotiate(FAST).unwrap_err();
        assert!(matches!(err, Error::Verification { from: SLOW, to: FAST }));
        assert_eq!(s.baud_rate(), SLOW);
        assert_eq!(s.port().baud_history(), &[FAST, SLOW]);
        assert_eq!(s.port().written(), b"SUP\r\nH\r\n");
        assert_eq!(s.port().clears(), 1);
    }

    #[test]
    fn test_failed_rollback_reports_rate() {
        use std::sync::{Arc, Mutex};

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let port = MockPort::new()
            .on("SUP\r\n", "Please change to 921.6Kbps baud rate")
            .refuse_baud(SLOW);
        let mut s = session(port).with_observer(move |e| sink.lock().unwrap().push(e.clone()));

        let err = s.negotiate(FAST).unwrap_err();
        match &err {
            Error::RollbackFailed { from, to, reason } => {
                assert_eq!((*from, *to), (SLOW, FAST));
                assert!(reason.contains("115200"), "{reason}");
            },
            other => panic!("expected RollbackFailed, got {other:?}"),
        }
        assert_eq!(s.baud_rate(), FAST);
        assert!(err.to_string().contains("rollback 921600 -> 115200 failed"));
        assert!(!events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::SpeedRolledBack { .. })));
    }

    #[test]
    fn test_rollback_event() {
        use std::sync::{Arc, Mutex};

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let port = MockPort::new().on("SUP\r\n", "Please change to 921.6Kbps baud rate");
        let mut s = session(port).with_observer(move |e| sink.lock().unwrap().push(e.clone()));

        assert!(s.negotiate(FAST).is_err());
        assert!(events.lock().unwrap().contains(&Event::SpeedRolledBack {
            from: SLOW,
            to: FAST
        }));
    }

    #[test]
    fn test_speed_down() {
        let mut s = session(
            MockPort::new()
                .on("SUP\r\n", "Please change to 921.6Kbps baud rate")
                .on_at(FAST, "H\r\n", ">")
                .on_at(FAST, "SUP\r\n", "Please change to 115.2Kbps baud rate")
                .on_at(SLOW, "H\r\n", ">"),
        );
        assert!(s.negotiate(FAST).unwrap());
        assert!(s.negotiate(SLOW).unwrap());
        assert_eq!(s.port().baud_history(), &[FAST, SLOW]);
    }
}
