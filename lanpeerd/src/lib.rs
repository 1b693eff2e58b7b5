pub mod config;
pub mod discovery;
pub mod engine;
pub mod mdns;
pub mod presenter;
pub mod registration;
pub mod registry;
pub mod resolve;
pub mod stack;

#[cfg(test)]
mod testutil;
