//! A typed client for the SDN management plane's JSON API.
//!
//! The SDN signals pre-existence with `409 Conflict`; this crate layers
//! strict idempotence on top of that: every create resolves conflicts through
//! a filtered lookup on the entity's natural key, and every lookup verifies
//! the key of whatever comes back.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod priority;
mod session;
#[cfg(test)]
mod tests;
pub mod types;

pub use self::{
    client::{Client, Direction},
    error::Error,
    priority::{PriorityAllocator, MAX_PRIORITY},
    session::Credentials,
};
