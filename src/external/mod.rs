//! Clients for services outside the bridge process.

pub mod delegate;
