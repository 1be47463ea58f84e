mod host;
mod loader;
mod logging;

pub use host::*;
pub use loader::*;
pub use logging::*;
