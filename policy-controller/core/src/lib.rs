#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod event;
mod pool;
mod subnet;

pub use self::{
    event::{EventKind, NamespaceEvent, ServiceEvent},
    pool::SubnetPool,
    subnet::{Error as SubnetError, Ipv4Subnet},
};
