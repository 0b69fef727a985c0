//! Tunnel authentication handshake
//!
//! 1. client sends `<user>:<ticket>\n`
//! 2. server replies with an acknowledgement, checked against the
//!    configured [`AckPolicy`]
//! 3. client sends its current terminal size as a resize frame

use std::time::Duration;

use px_core::traits::{TerminalSizeSource, TransportSink, TransportStream};
use px_core::RelayError;
use px_protocol::{encode_resize, AckPolicy, Credential, TerminalSize};

/// Authenticate an open connection and announce the terminal size.
///
/// Returns the size that was sent. The caller owns the connection and is
/// responsible for closing it if this fails.
pub async fn handshake(
    sink: &mut dyn TransportSink,
    stream: &mut dyn TransportStream,
    credential: &Credential,
    ack: &AckPolicy,
    sizes: &dyn TerminalSizeSource,
    reply_timeout: Duration,
) -> Result<TerminalSize, RelayError> {
    tracing::debug!("authenticating as '{}'", credential.user());
    sink.send(credential.auth_line().into())
        .await
        .map_err(|source| RelayError::Write {
            frame: "auth",
            source,
        })?;

    let reply = match tokio::time::timeout(reply_timeout, stream.recv()).await {
        Err(_) => {
            return Err(RelayError::Auth {
                reason: format!("no acknowledgement within {:?}", reply_timeout),
            })
        }
        Ok(None) => {
            return Err(RelayError::Auth {
                reason: "connection closed before acknowledgement".to_string(),
            })
        }
        Ok(Some(Err(e))) => {
            return Err(RelayError::Auth {
                reason: format!("failed to read acknowledgement: {}", e),
            })
        }
        Ok(Some(Ok(reply))) => reply,
    };

    if !ack.accepts(credential, &reply) {
        return Err(RelayError::Auth {
            reason: format!(
                "unexpected acknowledgement {:?}",
                String::from_utf8_lossy(&reply)
            ),
        });
    }

    let size = sizes.current_size();
    tracing::debug!("sending terminal size: {}", size);
    sink.send(encode_resize(size))
        .await
        .map_err(|source| RelayError::Write {
            frame: "resize",
            source,
        })?;

    Ok(size)
}
