pub mod digest;
pub mod fixture;
pub mod harness;
pub mod runner;
pub mod scenarios;
pub mod verifier;

mod traits;

pub use traits::ToolExecutor;
