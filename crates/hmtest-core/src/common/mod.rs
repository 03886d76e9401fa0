pub mod config;

pub use config::{HarnessConfig, normalize_path, resolve_path};
