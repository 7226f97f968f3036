//! LLCP - NFC Logical Link Control Protocol
//!
//! This library implements the LLCP layer that runs above an NFC-DEP MAC:
//! link activation with parameter exchange, a service registry with
//! service discovery, connection-oriented and connectionless transport,
//! and the symmetry procedure that keeps a half-duplex link turning.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use llcp::{Link, LinkConfig, MacLink, MacRole, Sap, Service, mac::pipe};
//!
//! let server = Link::new(LinkConfig::default());
//! server.register(
//!     Service::new(|conn| {
//!         while let Ok((payload, _)) = conn.recv(None) {
//!             let _ = conn.send(payload);
//!         }
//!     })
//!     .with_uri("urn:nfc:sn:echo"),
//! )?;
//!
//! let client = Link::new(LinkConfig::default());
//! let local = client.register(Service::new(|_| {}))?;
//!
//! let (a, b) = pipe::pair();
//! let target = MacLink::new(b, server)?.spawn(MacRole::Target)?;
//! let initiator = MacLink::new(a, client)?.spawn(MacRole::Initiator)?;
//!
//! let conn = initiator.link().connect(local, "urn:nfc:sn:echo")?;
//! conn.send(&b"ping"[..])?;
//! let (echo, _) = conn.recv(None)?;
//! assert_eq!(echo.as_ref(), b"ping");
//! conn.disconnect();
//!
//! initiator.deactivate();
//! initiator.join()?;
//! target.join()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Features
//!
//! - **PDU codec** - all thirteen PDU types with TLV parameters
//! - **Flow control** - mod-16 sequencing with per-connection receive windows
//! - **Service discovery** - SDP requests and connect-by-name
//! - **Pluggable MAC** - any half-duplex frame exchange behind [`mac::Mac`]

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod llc;
pub mod mac;
pub mod protocol;

pub use llc::{
    Connection, ConnectionError, ConnectionState, Link, LinkConfig, LinkError, RegistryError,
    Service, Target,
};
pub use mac::{Mac, MacError, MacLink, MacLinkHandle, MacRole};
pub use protocol::{Error, Parameter, Pdu, PduBody, PduType, Result, Sap};
