//! Username/password authentication
//!
//! Implements RFC 1929 username/password sub-negotiation for SOCKS5, in both
//! the verifying (gateway) and submitting (forwarder) direction.

use crate::error::Socks5Error;
use crate::socks::consts::{
    MAX_CREDENTIAL_LEN, SOCKS5_AUTH_FAILURE, SOCKS5_AUTH_SUCCESS, SOCKS5_AUTH_VERSION,
};
use bytes::{BufMut, BytesMut};
use std::collections::HashMap;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Credential lookup used by the gateway.
///
/// Implementations are shared read-only across sessions.
pub trait CredentialStore: Send + Sync {
    /// Returns true when `password` is the exact password for `username`
    fn verify(&self, username: &[u8], password: &[u8]) -> bool;
}

impl<F> CredentialStore for F
where
    F: Fn(&[u8], &[u8]) -> bool + Send + Sync,
{
    fn verify(&self, username: &[u8], password: &[u8]) -> bool {
        self(username, password)
    }
}

/// Username to password mapping
#[derive(Debug, Clone, Default)]
pub struct UserTable {
    users: HashMap<Vec<u8>, Vec<u8>>,
}

impl UserTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from username/password pairs
    pub fn from_pairs<I, U, P>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: AsRef<[u8]>,
        P: AsRef<[u8]>,
    {
        let mut table = Self::new();
        for (username, password) in pairs {
            table.insert(username, password);
        }
        table
    }

    /// Add or replace a user
    pub fn insert(&mut self, username: impl AsRef<[u8]>, password: impl AsRef<[u8]>) {
        self.users
            .insert(username.as_ref().to_vec(), password.as_ref().to_vec());
    }

    /// Number of users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl From<&HashMap<String, String>> for UserTable {
    fn from(users: &HashMap<String, String>) -> Self {
        UserTable::from_pairs(users.iter())
    }
}

impl CredentialStore for UserTable {
    fn verify(&self, username: &[u8], password: &[u8]) -> bool {
        self.users
            .get(username)
            .map_or(false, |expected| expected.as_slice() == password)
    }
}

/// A username/password pair submitted to an upstream gateway
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: Vec<u8>,
    password: Vec<u8>,
}

impl Credentials {
    /// Create credentials, checking that both fields fit the wire format
    pub fn new(
        username: impl Into<Vec<u8>>,
        password: impl Into<Vec<u8>>,
    ) -> Result<Self, Socks5Error> {
        let username = username.into();
        let password = password.into();

        if username.is_empty() {
            return Err(Socks5Error::InvalidUsernameLength);
        }
        if password.is_empty() {
            return Err(Socks5Error::InvalidPasswordLength);
        }
        for field in [&username, &password] {
            if field.len() > MAX_CREDENTIAL_LEN {
                return Err(Socks5Error::CredentialTooLong(field.len()));
            }
        }

        Ok(Self { username, password })
    }

    /// Username bytes
    pub fn username(&self) -> &[u8] {
        &self.username
    }

    /// Encode as `VER | ULEN | UNAME | PLEN | PASSWD`
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(3 + self.username.len() + self.password.len());
        buf.put_u8(SOCKS5_AUTH_VERSION);
        buf.put_u8(self.username.len() as u8);
        buf.put_slice(&self.username);
        buf.put_u8(self.password.len() as u8);
        buf.put_slice(&self.password);
        buf
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Verify a client's credentials.
///
/// # Protocol
///
/// Client sends:
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// Server responds:
/// ```text
/// +----+--------+
/// |VER | STATUS |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
///
/// Malformed requests and wrong credentials both get exactly one failure
/// reply; the caller must then drop the connection.
pub async fn verify_credentials<S>(
    stream: &mut S,
    store: &dyn CredentialStore,
) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Read version and username length
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let username_len = buf[1] as usize;

    if version != SOCKS5_AUTH_VERSION {
        send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
        return Err(Socks5Error::InvalidAuthVersion(version));
    }

    if username_len == 0 {
        send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
        return Err(Socks5Error::InvalidUsernameLength);
    }

    let mut username = vec![0u8; username_len];
    stream.read_exact(&mut username).await?;

    let password_len = stream.read_u8().await? as usize;

    if password_len == 0 {
        send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
        return Err(Socks5Error::InvalidPasswordLength);
    }

    let mut password = vec![0u8; password_len];
    stream.read_exact(&mut password).await?;

    let verified = store.verify(&username, &password);
    let username = String::from_utf8_lossy(&username).into_owned();

    if verified {
        send_auth_result(stream, SOCKS5_AUTH_SUCCESS).await?;
        tracing::debug!("Authentication successful for user: {}", username);
        Ok(())
    } else {
        send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
        Err(Socks5Error::AuthFailed(username))
    }
}

/// Submit `credentials` to an upstream gateway and check its verdict
pub async fn submit_credentials<S>(
    stream: &mut S,
    credentials: &Credentials,
) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&credentials.encode()).await?;
    stream.flush().await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;

    if reply[0] != SOCKS5_AUTH_VERSION {
        return Err(Socks5Error::InvalidAuthVersion(reply[0]));
    }

    if reply[1] != SOCKS5_AUTH_SUCCESS {
        return Err(Socks5Error::AuthRejected(reply[1]));
    }

    Ok(())
}

/// Send authentication result to client
async fn send_auth_result<S: AsyncWrite + Unpin>(
    stream: &mut S,
    status: u8,
) -> Result<(), Socks5Error> {
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}
