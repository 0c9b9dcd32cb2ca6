//! Target SoC catalogue.

pub mod soc;

pub use soc::SocModel;
