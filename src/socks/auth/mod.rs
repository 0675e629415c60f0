//! SOCKS5 authentication module
//!
//! Method negotiation in both directions, and the username/password
//! sub-negotiation in [`password`].

mod password;

pub use password::{
    submit_credentials, verify_credentials, CredentialStore, Credentials, UserTable,
};

use super::consts::*;
use crate::error::Socks5Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Authentication method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password authentication
    Password,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }

    /// Parse from SOCKS5 method byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_AUTH_METHOD_NONE => Some(AuthMethod::None),
            SOCKS5_AUTH_METHOD_PASSWORD => Some(AuthMethod::Password),
            _ => None,
        }
    }
}

/// Result of method selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// Proceed without authentication
    NoAuth,
    /// Username/password sub-negotiation follows
    UsernamePassword,
    /// Nothing acceptable was offered
    Rejected,
}

impl NegotiationOutcome {
    /// Method byte written back to the client
    pub fn reply_byte(self) -> u8 {
        match self {
            NegotiationOutcome::NoAuth => SOCKS5_AUTH_METHOD_NONE,
            NegotiationOutcome::UsernamePassword => SOCKS5_AUTH_METHOD_PASSWORD,
            NegotiationOutcome::Rejected => SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE,
        }
    }
}

/// Select a method from the client's list.
///
/// Username/password wins whenever it is both offered and enabled, even if
/// no-auth is offered too.
pub fn select_method(offered: &[u8], enabled: &[AuthMethod]) -> NegotiationOutcome {
    let usable = |method: AuthMethod| enabled.contains(&method) && offered.contains(&method.to_byte());

    if usable(AuthMethod::Password) {
        NegotiationOutcome::UsernamePassword
    } else if usable(AuthMethod::None) {
        NegotiationOutcome::NoAuth
    } else {
        NegotiationOutcome::Rejected
    }
}

/// Run the server side of method negotiation.
///
/// Reads `VER | NMETHODS | METHODS`, writes `VER | METHOD`. A rejected
/// negotiation is answered with `05 FF` before the error is returned.
pub async fn negotiate_method<S>(
    stream: &mut S,
    enabled: &[AuthMethod],
) -> Result<AuthMethod, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let num_methods = buf[1] as usize;

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version));
    }

    if num_methods == 0 {
        return Err(Socks5Error::NoMethodsOffered);
    }

    let mut methods = vec![0u8; num_methods];
    stream.read_exact(&mut methods).await?;

    let outcome = select_method(&methods, enabled);
    debug!("Client offered methods {:?}, selected {:?}", methods, outcome);

    stream
        .write_all(&[SOCKS5_VERSION, outcome.reply_byte()])
        .await?;
    stream.flush().await?;

    match outcome {
        NegotiationOutcome::NoAuth => Ok(AuthMethod::None),
        NegotiationOutcome::UsernamePassword => Ok(AuthMethod::Password),
        NegotiationOutcome::Rejected => Err(Socks5Error::NoAcceptableMethod),
    }
}

/// Negotiate a method and, when username/password was chosen, verify the
/// client's credentials against `store`.
pub async fn authenticate<S>(
    stream: &mut S,
    enabled: &[AuthMethod],
    store: &dyn CredentialStore,
) -> Result<AuthMethod, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let method = negotiate_method(stream, enabled).await?;

    if method == AuthMethod::Password {
        verify_credentials(stream, store).await?;
    }

    Ok(method)
}

/// Run the client side of method negotiation, offering exactly `method`.
pub async fn request_method<S>(stream: &mut S, method: AuthMethod) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let offered = method.to_byte();
    stream.write_all(&[SOCKS5_VERSION, 1, offered]).await?;
    stream.flush().await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;

    if reply[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(reply[0]));
    }

    if reply[1] != offered {
        return Err(Socks5Error::MethodMismatch {
            offered,
            selected: reply[1],
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const BOTH: &[AuthMethod] = &[AuthMethod::None, AuthMethod::Password];

    fn table() -> UserTable {
        UserTable::from_pairs([("Usr1", "Pwd1")])
    }

    #[test]
    fn test_auth_method_bytes() {
        assert_eq!(AuthMethod::None.to_byte(), SOCKS5_AUTH_METHOD_NONE);
        assert_eq!(AuthMethod::Password.to_byte(), SOCKS5_AUTH_METHOD_PASSWORD);
        assert_eq!(AuthMethod::from_byte(2), Some(AuthMethod::Password));
        assert_eq!(AuthMethod::from_byte(1), None);
        assert_eq!(AuthMethod::from_byte(255), None);
    }

    #[test]
    fn test_select_prefers_password() {
        let offered = [SOCKS5_AUTH_METHOD_NONE, SOCKS5_AUTH_METHOD_PASSWORD];
        assert_eq!(
            select_method(&offered, BOTH),
            NegotiationOutcome::UsernamePassword
        );

        let offered = [SOCKS5_AUTH_METHOD_PASSWORD, SOCKS5_AUTH_METHOD_NONE];
        assert_eq!(
            select_method(&offered, BOTH),
            NegotiationOutcome::UsernamePassword
        );
    }

    #[test]
    fn test_select_falls_back_to_no_auth() {
        let offered = [0x01, SOCKS5_AUTH_METHOD_NONE];
        assert_eq!(select_method(&offered, BOTH), NegotiationOutcome::NoAuth);
    }

    #[test]
    fn test_select_respects_enabled_methods() {
        let offered = [SOCKS5_AUTH_METHOD_NONE, SOCKS5_AUTH_METHOD_PASSWORD];
        assert_eq!(
            select_method(&offered, &[AuthMethod::None]),
            NegotiationOutcome::NoAuth
        );
        assert_eq!(
            select_method(&[SOCKS5_AUTH_METHOD_NONE], &[AuthMethod::Password]),
            NegotiationOutcome::Rejected
        );
    }

    #[test]
    fn test_select_rejects_unsupported() {
        assert_eq!(select_method(&[0x01, 0x03, 0x80], BOTH), NegotiationOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_negotiate_rejection_reply() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&[0x05, 0x02, 0x01, 0x03]).await.unwrap();

        let err = negotiate_method(&mut server, BOTH).await.unwrap_err();
        assert!(matches!(err, Socks5Error::NoAcceptableMethod));

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0xFF]);
    }

    #[tokio::test]
    async fn test_negotiate_no_auth() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

        let method = negotiate_method(&mut server, &[AuthMethod::None])
            .await
            .unwrap();
        assert_eq!(method, AuthMethod::None);

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn test_negotiate_exact_exchange() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&[0x05, 0x02, 0x00, 0x02])
            .write(&[0x05, 0x02])
            .build();

        let method = negotiate_method(&mut stream, BOTH).await.unwrap();
        assert_eq!(method, AuthMethod::Password);
    }

    #[tokio::test]
    async fn test_negotiate_bad_version() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

        let err = negotiate_method(&mut server, BOTH).await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedVersion(4)));
    }

    #[tokio::test]
    async fn test_negotiate_empty_method_list() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&[0x05, 0x00]).await.unwrap();

        let err = negotiate_method(&mut server, BOTH).await.unwrap_err();
        assert!(matches!(err, Socks5Error::NoMethodsOffered));
    }

    #[tokio::test]
    async fn test_negotiate_short_method_list() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&[0x05, 0x03, 0x00]).await.unwrap();
        drop(client);

        let err = negotiate_method(&mut server, BOTH).await.unwrap_err();
        assert!(matches!(err, Socks5Error::Io(_)));
    }

    #[tokio::test]
    async fn test_authenticate_with_password() {
        let (mut client, mut server) = duplex(1024);
        client
            .write_all(&[0x05, 0x01, 0x02, 0x01, 4, b'U', b's', b'r', b'1', 4, b'P', b'w', b'd', b'1'])
            .await
            .unwrap();

        let store = table();
        let method = authenticate(&mut server, BOTH, &store).await.unwrap();
        assert_eq!(method, AuthMethod::Password);

        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x02, 0x01, 0x00]);
    }

    #[tokio::test]
    async fn test_request_method_accepted() {
        let (mut client, mut server) = duplex(1024);
        server.write_all(&[0x05, 0x02]).await.unwrap();

        request_method(&mut client, AuthMethod::Password).await.unwrap();

        let mut sent = [0u8; 3];
        server.read_exact(&mut sent).await.unwrap();
        assert_eq!(sent, [0x05, 0x01, 0x02]);
    }

    #[tokio::test]
    async fn test_request_method_mismatch() {
        let (mut client, mut server) = duplex(1024);
        server.write_all(&[0x05, 0xFF]).await.unwrap();

        let err = request_method(&mut client, AuthMethod::Password)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Socks5Error::MethodMismatch {
                offered: 0x02,
                selected: 0xFF
            }
        ));
    }

    #[tokio::test]
    async fn test_request_method_bad_version() {
        let (mut client, mut server) = duplex(1024);
        server.write_all(&[0x04, 0x02]).await.unwrap();

        let err = request_method(&mut client, AuthMethod::Password)
            .await
            .unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedVersion(4)));
    }
}
