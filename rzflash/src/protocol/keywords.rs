//! Literal byte sequences emitted by the RZ boot ROM and Flash Writer.
//!
//! None of these are framed; each is matched as a substring of whatever the
//! device has printed so far.

/// Banner printed by the boot ROM in SCIF download mode.
pub const SCIF_DOWNLOAD_MODE: &[u8] = b"SCIF Download mode";

/// Banner printed by Flash Writer once it runs from SRAM.
pub const FLASH_WRITER_BANNER: &[u8] = b"Flash writer for";

/// Flash Writer command prompt.
pub const PROMPT: &[u8] = b">";

/// Ready phrase before an S-record transfer.
pub const PLEASE_SEND_SREC: &[u8] = b"please send ! ('.' & CR stop load)";

/// Ready phrase before a raw binary transfer to QSPI.
pub const PLEASE_SEND_BINARY: &[u8] = b"please send ! (binary)";

/// Ready phrase common to both eMMC transfers.
pub const PLEASE_SEND: &[u8] = b"please send !";

/// eMMC write completion.
pub const COMPLETE: &[u8] = b"Complete!";

/// Device asks the host to switch to 921600 bps.
pub const SPEED_UP_REQUEST: &[u8] = b"Please change to 921.6Kbps baud rate";

/// Device asks the host to switch to 115200 bps.
pub const SPEED_DOWN_REQUEST: &[u8] = b"Please change to 115.2Kbps baud rate";

/// XLS2 program address prompt.
pub const PROGRAM_TOP_ADDRESS: &[u8] = b"Program Top Address";

/// XLS2/XLS3 QSPI address prompt.
pub const QSPI_SAVE_ADDRESS: &[u8] = b"Qspi Save Address";

/// XLS3 size prompt.
pub const PROGRAM_SIZE: &[u8] = b"Program size";

/// eMMC partition prompt.
pub const SELECT_AREA: &[u8] = b"Select area";

/// eMMC start sector prompt.
pub const START_ADDRESS_IN_SECTOR: &[u8] = b"Please Input Start Address in sector";

/// eMMC program address prompt.
pub const PROGRAM_START_ADDRESS: &[u8] = b"Please Input Program Start Address";

/// QSPI erase confirmation (not always printed).
pub const CLEAR_OK: &[u8] = b"Clear OK?(y/n)";

/// QSPI erase completion.
pub const ERASE_COMPLETED: &[u8] = b"Erase Completed";

/// XLS2 save completion.
pub const SAVE: &[u8] = b"SAVE";

/// XLS3 save completion.
pub const SAVE_SPI_FLASH: &[u8] = b"SAVE SPI-FLASH.";

/// Host line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// End-of-transfer marker for S-record payloads.
pub const SREC_END_MARKER: &[u8] = b".\r\n";

/// Longest keyword in the vocabulary.
pub const LONGEST_KEYWORD: usize = longest(&[
    SCIF_DOWNLOAD_MODE,
    FLASH_WRITER_BANNER,
    PLEASE_SEND_SREC,
    PLEASE_SEND_BINARY,
    SPEED_UP_REQUEST,
    SPEED_DOWN_REQUEST,
    START_ADDRESS_IN_SECTOR,
    PROGRAM_START_ADDRESS,
]);

const fn longest(words: &[&[u8]]) -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < words.len() {
        if words[i].len() > max {
            max = words[i].len();
        }
        i += 1;
    }
    max
}

/// The "please change baud" phrase for switching to `target`, if supported.
pub fn speed_change_request(target: u32) -> Option<&'static [u8]> {
    match target {
        crate::port::HIGH_SPEED_BAUD => Some(SPEED_UP_REQUEST),
        crate::port::DEFAULT_BAUD => Some(SPEED_DOWN_REQUEST),
        _ => None,
    }
}
