//! Logical link control: service registry, connections, flow control and
//! the per-turn dispatch that multiplexes them over one MAC link.

mod config;
mod connection;
mod doorbell;
mod error;
mod link;
mod registry;
mod scheduler;
mod sdp;
mod service;
mod window;

pub use config::LinkConfig;
pub use connection::{Connection, ConnectionState};
pub use error::{ConnectionError, LinkError, RegistryError};
pub use link::{Link, RemoteParameters, Target};
pub use sdp::SDP_URI;
pub use service::{Handler, Service};

pub(crate) use link::Flow;
