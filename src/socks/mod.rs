//! SOCKS5 protocol engine
//!
//! Method negotiation, username/password authentication, request parsing,
//! destination acquisition, reply encoding and the duplex relay. The
//! gateway and the forwarder are both assembled from these pieces.

mod auth;
mod command;
pub mod consts;
mod connector;
mod tcp_relay;
mod types;

pub use auth::{
    authenticate, negotiate_method, request_method, select_method, submit_credentials,
    verify_credentials, AuthMethod, CredentialStore, Credentials, NegotiationOutcome, UserTable,
};
pub use command::{encode_reply, parse_request, send_failure, send_success, write_reply};
pub use connector::{classify_connect_error, connect_direct, UpstreamConnector};
pub use tcp_relay::{relay_tcp, RelayStats};
pub use types::{SocksAddr, SocksCommand};
