pub mod config;
pub mod estimator;
pub mod sample;
pub mod severity;
#[cfg(test)]
mod tests;

pub use config::*;
pub use estimator::*;
pub use sample::*;
pub use severity::*;
