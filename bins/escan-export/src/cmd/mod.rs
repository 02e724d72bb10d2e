pub mod config;
pub mod error;
pub mod export;
pub mod writer;

#[cfg(test)]
pub(crate) mod mock;
