//! Core traits for the reconciliation system
//!
//! - [`DnsProvider`]: Fetch and write records through a vendor API
//! - [`DnsProviderFactory`]: Build a provider from its configuration

pub mod dns_provider;

pub use dns_provider::{DnsProvider, DnsProviderFactory};
