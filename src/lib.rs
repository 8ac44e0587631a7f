pub mod args;
pub mod batch;
pub mod config;
pub mod errors;
pub mod keyring;
pub mod pipeline;
pub mod resolve;
pub mod sign;
#[cfg(test)]
pub(crate) mod test_utils;
