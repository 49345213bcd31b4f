//! Sessions and the registry that owns them.

mod handle;
mod registry;

pub use handle::Session;
pub use registry::SessionRegistry;
