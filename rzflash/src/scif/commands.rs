//! The four Flash Writer programming commands, as scripts.
//!
//! | command | payload  | destination |
//! |---------|----------|-------------|
//! | `XLS2`  | S-record | QSPI flash  |
//! | `XLS3`  | binary   | QSPI flash  |
//! | `EM_W`  | S-record | eMMC        |
//! | `EM_WB` | binary   | eMMC        |

use super::script::{CommandScript, Payload, Policy, Step};
use crate::error::Result;
use crate::protocol::hex::HexToken;
use crate::protocol::keywords::{
    CLEAR_OK, COMPLETE, ERASE_COMPLETED, PLEASE_SEND, PLEASE_SEND_BINARY, PLEASE_SEND_SREC,
    PROGRAM_SIZE, PROGRAM_START_ADDRESS, PROGRAM_TOP_ADDRESS, PROMPT, QSPI_SAVE_ADDRESS, SAVE,
    SAVE_SPI_FLASH, SELECT_AREA, START_ADDRESS_IN_SECTOR,
};
use crate::protocol::transfer::EndMarker;
use std::fmt;
use std::time::Duration;

/// Deadline for address and size prompts.
const PROMPT_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline for the "please send" phrase.
const READY_TIMEOUT: Duration = Duration::from_secs(10);
/// Settle time after a prompt, before answering it.
const ANSWER_DELAY: Duration = Duration::from_millis(500);
/// Settle time after a QSPI payload.
const POST_TRANSFER_DELAY: Duration = Duration::from_secs(1);

/// A Flash Writer programming command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FlashCommand {
    /// S-record to QSPI.
    Xls2,
    /// Binary to QSPI.
    Xls3,
    /// S-record to eMMC.
    EmW,
    /// Binary to eMMC.
    EmWb,
}

impl FlashCommand {
    /// Command text typed at the Flash Writer prompt.
    pub fn name(self) -> &'static str {
        match self {
            Self::Xls2 => "XLS2",
            Self::Xls3 => "XLS3",
            Self::EmW => "EM_W",
            Self::EmWb => "EM_WB",
        }
    }

    /// Whether the command writes to eMMC.
    pub fn is_emmc(self) -> bool {
        matches!(self, Self::EmW | Self::EmWb)
    }
}

impl fmt::Display for FlashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// eMMC destination shared by `EM_W` and `EM_WB`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmmcLocation {
    /// Partition (area) index, sent in decimal.
    pub partition: u32,
    /// First sector.
    pub start_sector: HexToken,
    /// Load address reported to Flash Writer.
    pub program_address: HexToken,
}

impl CommandScript {
    /// `XLS2`: S-record image to QSPI.
    pub fn xls2(payload: Payload, program_address: HexToken, flash_address: HexToken) -> Self {
        let mut steps = vec![
            Step::Send(FlashCommand::Xls2.name().into()),
            Step::hard(PROGRAM_TOP_ADDRESS, PROMPT_TIMEOUT),
            Step::Pause(ANSWER_DELAY),
            Step::value("program address", &program_address),
            Step::hard(QSPI_SAVE_ADDRESS, PROMPT_TIMEOUT),
            Step::Pause(ANSWER_DELAY),
            Step::value("flash address", &flash_address),
            Step::hard(PLEASE_SEND_SREC, READY_TIMEOUT),
            Step::Transfer {
                payload,
                end_marker: EndMarker::SRecord,
            },
        ];
        steps.extend(qspi_tail(Duration::from_secs(30), SAVE));
        Self::new(FlashCommand::Xls2, steps)
    }

    /// `XLS3`: raw binary to QSPI. The size prompt is answered with the payload length.
    pub fn xls3(payload: Payload, flash_address: HexToken) -> Result<Self> {
        let size = HexToken::from_u64(payload.len()?);
        let mut steps = vec![
            Step::Send(FlashCommand::Xls3.name().into()),
            Step::hard(PROGRAM_SIZE, PROMPT_TIMEOUT),
            Step::Pause(ANSWER_DELAY),
            Step::value("program size", &size),
            Step::hard(QSPI_SAVE_ADDRESS, PROMPT_TIMEOUT),
            Step::Pause(ANSWER_DELAY),
            Step::value("flash address", &flash_address),
            Step::hard(PLEASE_SEND_BINARY, READY_TIMEOUT),
            Step::Transfer {
                payload,
                end_marker: EndMarker::None,
            },
        ];
        steps.extend(qspi_tail(Duration::from_secs(60), SAVE_SPI_FLASH));
        Ok(Self::new(FlashCommand::Xls3, steps))
    }

    /// `EM_W`: S-record image to eMMC.
    pub fn em_w(payload: Payload, location: &EmmcLocation) -> Self {
        Self::new(
            FlashCommand::EmW,
            emmc_steps(FlashCommand::EmW, payload, location, EndMarker::SRecord),
        )
    }

    /// `EM_WB`: raw binary to eMMC.
    pub fn em_wb(payload: Payload, location: &EmmcLocation) -> Self {
        Self::new(
            FlashCommand::EmWb,
            emmc_steps(FlashCommand::EmWb, payload, location, EndMarker::None),
        )
    }
}

/// Erase confirmation, save and prompt, common to both QSPI commands.
fn qspi_tail(erase_timeout: Duration, saved: &'static [u8]) -> Vec<Step> {
    vec![
        Step::Pause(POST_TRANSFER_DELAY),
        // Only printed when the target sectors are not blank.
        Step::Confirm {
            keyword: CLEAR_OK,
            timeout: Duration::from_secs(10),
            reply: "y".into(),
            then: vec![
                Step::soft(ERASE_COMPLETED, erase_timeout),
                Step::Pause(POST_TRANSFER_DELAY),
            ],
        },
        Step::soft(saved, Duration::from_secs(60)),
        Step::soft(PROMPT, Duration::from_secs(10)),
    ]
}

fn emmc_steps(
    command: FlashCommand,
    payload: Payload,
    location: &EmmcLocation,
    end_marker: EndMarker,
) -> Vec<Step> {
    vec![
        Step::Send(command.name().into()),
        Step::hard(SELECT_AREA, PROMPT_TIMEOUT),
        Step::SendValue {
            label: "partition",
            value: location.partition.to_string(),
        },
        Step::hard(START_ADDRESS_IN_SECTOR, PROMPT_TIMEOUT),
        Step::value("start sector", &location.start_sector),
        Step::hard(PROGRAM_START_ADDRESS, PROMPT_TIMEOUT),
        Step::value("program address", &location.program_address),
        Step::hard(PLEASE_SEND, READY_TIMEOUT),
        Step::Transfer {
            payload,
            end_marker,
        },
        Step::Await {
            keyword: COMPLETE,
            timeout: Duration::from_secs(30),
            policy: Policy::Hard,
        },
        Step::soft(PROMPT, Duration::from_secs(5)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent_lines(script: &CommandScript) -> Vec<String> {
        script
            .steps()
            .iter()
            .filter_map(|s| match s {
                Step::Send(text) => Some(text.clone()),
                Step::SendValue { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_command_names() {
        assert_eq!(FlashCommand::Xls2.to_string(), "XLS2");
        assert_eq!(FlashCommand::Xls3.to_string(), "XLS3");
        assert_eq!(FlashCommand::EmW.to_string(), "EM_W");
        assert_eq!(FlashCommand::EmWb.to_string(), "EM_WB");
        assert!(FlashCommand::EmWb.is_emmc());
        assert!(!FlashCommand::Xls3.is_emmc());
    }

    #[test]
    fn test_xls2_answers_in_hex() {
        let script = CommandScript::xls2(
            Payload::Bytes(b"S0\r\n".to_vec()),
            HexToken::from(0x11E00u32),
            HexToken::from(0u32),
        );
        assert_eq!(sent_lines(&script), vec!["XLS2", "11E00", "0"]);
    }

    #[test]
    fn test_xls3_size_from_payload() {
        let script =
            CommandScript::xls3(Payload::Bytes(vec![0; 4096]), HexToken::from(0x1D200u32)).unwrap();
        assert_eq!(sent_lines(&script), vec!["XLS3", "1000", "1D200"]);
    }

    #[test]
    fn test_xls3_missing_file() {
        let result = CommandScript::xls3(
            Payload::File("/nonexistent/fip.bin".into()),
            HexToken::from(0u32),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_emmc_partition_is_decimal() {
        let location = EmmcLocation {
            partition: 12,
            start_sector: HexToken::from(0x100u32),
            program_address: HexToken::from(0x11E00u32),
        };
        let script = CommandScript::em_wb(Payload::Bytes(vec![1]), &location);
        assert_eq!(sent_lines(&script), vec!["EM_WB", "12", "100", "11E00"]);
    }

    fn erase_branch(script: &CommandScript) -> &[Step] {
        script
            .steps()
            .iter()
            .find_map(|s| match s {
                Step::Confirm { then, .. } => Some(then.as_slice()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_qspi_erase_branch_settles() {
        let xls2 = CommandScript::xls2(
            Payload::Bytes(b"S0\r\n".to_vec()),
            HexToken::from(0x11E00u32),
            HexToken::from(0u32),
        );
        assert_eq!(
            erase_branch(&xls2),
            &[
                Step::soft(ERASE_COMPLETED, Duration::from_secs(30)),
                Step::Pause(POST_TRANSFER_DELAY),
            ]
        );

        let xls3 = CommandScript::xls3(Payload::Bytes(vec![0; 16]), HexToken::from(0u32)).unwrap();
        assert_eq!(
            erase_branch(&xls3),
            &[
                Step::soft(ERASE_COMPLETED, Duration::from_secs(60)),
                Step::Pause(POST_TRANSFER_DELAY),
            ]
        );
    }

    #[test]
    fn test_emmc_has_no_erase_confirmation() {
        let location = EmmcLocation {
            partition: 1,
            start_sector: HexToken::from(1u32),
            program_address: HexToken::from(0x11E00u32),
        };
        let script = CommandScript::em_w(Payload::Bytes(vec![1]), &location);
        assert!(!script.steps().iter().any(|s| matches!(s, Step::Confirm { .. })));
    }
}
