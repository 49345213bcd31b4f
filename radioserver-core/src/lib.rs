pub mod config;
pub mod device;
pub mod dsp;
pub mod error;
pub mod frontend;
pub mod logging;
pub mod metrics;
pub mod session;
pub mod version;

#[cfg(test)]
pub mod test_helpers;

pub use config::Config;
pub use error::{Error, Result};
pub use version::ProtocolVersion;

