pub mod assembler;
pub mod band;
pub mod cancel;
pub mod config;
pub mod duplicate;
pub mod error;
pub mod features;
pub mod hamming;
pub mod image;
pub mod ledger;
pub mod signature;

#[cfg(test)]
pub(crate) mod test_utils;
