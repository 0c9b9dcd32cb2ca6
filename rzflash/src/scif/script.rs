//! Command scripts and their executor.
//!
//! A script is an ordered list of typed [`Step`]s. The executor walks it on
//! a [`ScifSession`], stopping at the first hard step whose keyword never
//! arrives. Soft misses are recorded in the [`CommandOutcome`] and the script
//! carries on.

use super::{FlashCommand, ScifSession};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::port::Port;
use crate::protocol::hex::HexToken;
use crate::protocol::transfer::EndMarker;
use log::{debug, warn};
use std::path::PathBuf;
use std::time::Duration;

/// What a missed keyword means for the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Abort the script.
    Hard,
    /// Warn and continue.
    Soft,
}

/// Payload source for a transfer step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Stream from a file.
    File(PathBuf),
    /// Send from memory.
    Bytes(Vec<u8>),
}

impl Payload {
    /// Payload length in bytes.
    pub fn len(&self) -> Result<u64> {
        match self {
            Self::File(path) => std::fs::metadata(path)
                .map(|m| m.len())
                .map_err(|e| Error::Transfer(format!("cannot stat {}: {e}", path.display()))),
            Self::Bytes(data) => Ok(data.len() as u64),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// One step of a command script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send a literal line.
    Send(String),
    /// Send a computed value as a line.
    SendValue {
        /// What the value is, for logs.
        label: &'static str,
        /// Encoded value.
        value: String,
    },
    /// Wait for a keyword.
    Await {
        /// Keyword to wait for.
        keyword: &'static [u8],
        /// Deadline.
        timeout: Duration,
        /// What a miss means.
        policy: Policy,
    },
    /// If `keyword` appears, send `reply` and run `then`; otherwise skip.
    Confirm {
        /// Optional question.
        keyword: &'static [u8],
        /// How long to wait for it.
        timeout: Duration,
        /// Answer line.
        reply: String,
        /// Steps run after answering.
        then: Vec<Step>,
    },
    /// Send the payload.
    Transfer {
        /// Payload source.
        payload: Payload,
        /// Trailer after the payload.
        end_marker: EndMarker,
    },
    /// Sleep.
    Pause(Duration),
}

impl Step {
    /// A mandatory keyword.
    pub fn hard(keyword: &'static [u8], timeout: Duration) -> Self {
        Self::Await {
            keyword,
            timeout,
            policy: Policy::Hard,
        }
    }

    /// An optional keyword.
    pub fn soft(keyword: &'static [u8], timeout: Duration) -> Self {
        Self::Await {
            keyword,
            timeout,
            policy: Policy::Soft,
        }
    }

    /// A hex value line.
    pub fn value(label: &'static str, token: &HexToken) -> Self {
        Self::SendValue {
            label,
            value: token.as_str().to_owned(),
        }
    }
}

/// Steps for one programming command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandScript {
    command: FlashCommand,
    steps: Vec<Step>,
}

impl CommandScript {
    /// Build a script from explicit steps.
    pub fn new(command: FlashCommand, steps: Vec<Step>) -> Self {
        Self { command, steps }
    }

    /// Command this script implements.
    pub fn command(&self) -> FlashCommand {
        self.command
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// A soft step whose keyword never arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftMiss {
    /// Zero-based index of the top-level step.
    pub step: usize,
    /// Keyword that did not arrive.
    pub keyword: String,
}

/// Result of a script that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Command that ran.
    pub command: FlashCommand,
    /// Soft steps that missed their keyword.
    pub degraded: Vec<SoftMiss>,
}

impl CommandOutcome {
    /// Whether any soft step missed. The device may still have been busy.
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

impl<P: Port> ScifSession<P> {
    /// Run a command script to completion.
    ///
    /// # Errors
    ///
    /// [`Error::HardTimeout`] when a hard step misses; nothing after that step
    /// is sent. Transfer, I/O and interrupt errors propagate unchanged.
    pub fn run(&mut self, script: &CommandScript) -> Result<CommandOutcome> {
        let command = script.command;
        self.emit(&Event::CommandStarted(command));

        let mut outcome = CommandOutcome {
            command,
            degraded: Vec::new(),
        };
        for (index, step) in script.steps.iter().enumerate() {
            if let Err(e) = self.run_step(command, index, step, &mut outcome) {
                self.emit(&Event::CommandFailed {
                    command,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        }

        if outcome.is_degraded() {
            warn!(
                "{command} finished without confirmation from the device; the write may be incomplete"
            );
        }
        self.emit(&Event::CommandSucceeded {
            command,
            degraded: outcome.is_degraded(),
        });
        Ok(outcome)
    }

    fn run_step(
        &mut self,
        command: FlashCommand,
        index: usize,
        step: &Step,
        outcome: &mut CommandOutcome,
    ) -> Result<()> {
        match step {
            Step::Send(text) => self.send_line(text),
            Step::SendValue { label, value } => {
                debug!("{command}: sending {label} {value}");
                self.send_line(value)
            },
            Step::Await {
                keyword,
                timeout,
                policy,
            } => {
                if self.wait_for(keyword, *timeout)? {
                    return Ok(());
                }
                let keyword = String::from_utf8_lossy(keyword).into_owned();
                match policy {
                    Policy::Hard => Err(Error::HardTimeout {
                        command,
                        step: index,
                        keyword,
                        recent: self.recent_output(),
                    }),
                    Policy::Soft => {
                        self.emit(&Event::SoftTimeout {
                            command,
                            step: index,
                            keyword: keyword.clone(),
                        });
                        outcome.degraded.push(SoftMiss {
                            step: index,
                            keyword,
                        });
                        Ok(())
                    },
                }
            },
            Step::Confirm {
                keyword,
                timeout,
                reply,
                then,
            } => {
                if !self.wait_for(keyword, *timeout)? {
                    debug!(
                        "{command}: {:?} not asked, skipping",
                        String::from_utf8_lossy(keyword)
                    );
                    return Ok(());
                }
                self.send_line(reply)?;
                for nested in then {
                    self.run_step(command, index, nested, outcome)?;
                }
                Ok(())
            },
            Step::Transfer {
                payload,
                end_marker,
            } => {
                match payload {
                    Payload::File(path) => self.send_file(path, *end_marker)?,
                    Payload::Bytes(data) => self.send_payload(data, *end_marker)?,
                };
                Ok(())
            },
            Step::Pause(duration) => {
                self.sleep(*duration);
                Ok(())
            },
        }
    }
}
