pub mod error;
pub mod paths;
pub mod process;

pub use error::PlatformError;
pub use paths::{DefaultPaths, PlatformPaths};
pub use process::BackendCommand;
