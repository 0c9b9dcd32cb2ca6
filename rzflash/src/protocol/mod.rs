//! SCIF wire protocol building blocks.

pub mod hex;
pub mod keywords;
pub mod reader;
pub mod transfer;

// Re-export common types
pub use hex::HexToken;
pub use reader::KeywordReader;
pub use transfer::{EndMarker, TransferOptions, TransferResult};
