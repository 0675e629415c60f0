//! Error types for Sockgate
//!
//! [`Socks5Error`] is the protocol engine's internal error kind. It is used
//! for branching and logging; the wire status owed to a peer is derived from
//! it separately through [`Socks5Error::reply_status`].

use std::io;
use thiserror::Error;

/// Process-level error for Sockgate
///
/// Session failures stay [`Socks5Error`]s wrapped in `anyhow` context; this
/// type covers what stops a role from starting.
#[derive(Error, Debug)]
pub enum SockgateError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// SOCKS5 specific errors
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Transport failure while reading or writing the control exchange
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// The method list was empty
    #[error("No authentication methods offered")]
    NoMethodsOffered,

    /// No acceptable authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// The upstream picked a method other than the one offered
    #[error("Upstream selected method {selected:#04x}, offered {offered:#04x}")]
    MethodMismatch {
        /// Method offered by us
        offered: u8,
        /// Method returned by the upstream
        selected: u8,
    },

    /// Username/password sub-negotiation version was not 1
    #[error("Invalid auth version: {0}")]
    InvalidAuthVersion(u8),

    /// Zero-length username
    #[error("Invalid username length: 0")]
    InvalidUsernameLength,

    /// Zero-length password
    #[error("Invalid password length: 0")]
    InvalidPasswordLength,

    /// A credential does not fit its one-byte length prefix
    #[error("Credential too long: {0} bytes")]
    CredentialTooLong(usize),

    /// Credentials did not match
    #[error("Authentication failed for user: {0}")]
    AuthFailed(String),

    /// The upstream rejected our credentials
    #[error("Upstream rejected credentials with status {0:#04x}")]
    AuthRejected(u8),

    /// Command not supported
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// Reserved byte of the request was not zero
    #[error("Invalid reserved byte: {0}")]
    InvalidReserved(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Destination could not be resolved
    #[error("Unresolvable address: {0}")]
    UnresolvableAddress(String),

    /// The local stack cannot reach this address family or address
    #[error("Address unavailable: {0}")]
    AddressUnavailable(String),

    /// Connection refused
    #[error("Connection refused")]
    ConnectionRefused,

    /// Host unreachable
    #[error("Host unreachable")]
    HostUnreachable,

    /// Network unreachable
    #[error("Network unreachable")]
    NetworkUnreachable,

    /// Connect or handshake deadline elapsed
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// General SOCKS server failure
    #[error("General SOCKS server failure: {0}")]
    GeneralFailure(String),
}

impl Socks5Error {
    /// Reply status owed to the client for this error, if any.
    ///
    /// Only meaningful during the request phase. Transport and
    /// authentication errors return `None`: the connection is dropped
    /// without a request reply.
    pub fn reply_status(&self) -> Option<ReplyStatus> {
        match self {
            Socks5Error::UnsupportedVersion(_)
            | Socks5Error::CommandNotSupported(_)
            | Socks5Error::InvalidReserved(_) => Some(ReplyStatus::CommandNotSupported),
            Socks5Error::AddressTypeNotSupported(_)
            | Socks5Error::InvalidDomain(_)
            | Socks5Error::UnresolvableAddress(_)
            | Socks5Error::AddressUnavailable(_) => Some(ReplyStatus::AddressTypeNotSupported),
            Socks5Error::ConnectionRefused => Some(ReplyStatus::ConnectionRefused),
            Socks5Error::HostUnreachable | Socks5Error::Timeout(_) => {
                Some(ReplyStatus::HostUnreachable)
            }
            Socks5Error::NetworkUnreachable => Some(ReplyStatus::NetworkUnreachable),
            Socks5Error::GeneralFailure(_) => Some(ReplyStatus::GeneralFailure),
            Socks5Error::Io(_)
            | Socks5Error::NoMethodsOffered
            | Socks5Error::NoAcceptableMethod
            | Socks5Error::MethodMismatch { .. }
            | Socks5Error::InvalidAuthVersion(_)
            | Socks5Error::InvalidUsernameLength
            | Socks5Error::InvalidPasswordLength
            | Socks5Error::CredentialTooLong(_)
            | Socks5Error::AuthFailed(_)
            | Socks5Error::AuthRejected(_) => None,
        }
    }
}

/// Reply status of a SOCKS5 request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyStatus {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<ReplyStatus> for u8 {
    fn from(status: ReplyStatus) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for ReplyStatus {
    type Error = Socks5Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ReplyStatus::Succeeded),
            0x01 => Ok(ReplyStatus::GeneralFailure),
            0x03 => Ok(ReplyStatus::NetworkUnreachable),
            0x04 => Ok(ReplyStatus::HostUnreachable),
            0x05 => Ok(ReplyStatus::ConnectionRefused),
            0x07 => Ok(ReplyStatus::CommandNotSupported),
            0x08 => Ok(ReplyStatus::AddressTypeNotSupported),
            other => Err(Socks5Error::GeneralFailure(format!(
                "unknown reply status {:#04x}",
                other
            ))),
        }
    }
}
