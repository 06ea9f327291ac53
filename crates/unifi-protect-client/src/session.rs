//! WebSocket session: connection state machine, reader loop, reconnect.
//!
//! One task owns the socket and every mutation of the bootstrap graph.
//! Subscribers are dispatched synchronously from that task, which keeps the
//! graph single-writer and packet delivery in server order.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, connect_async_tls_with_config, Connector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ProtectClient;

/// Observable connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Authenticating,
    Bootstrapping,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Closing,
    Closed,
    Failed,
}

/// Reconnect backoff: base 1 s doubling to a 60 s cap, with a +-20%
/// deterministic jitter so a fleet of clients does not stampede the
/// controller after an outage.
pub(crate) fn reconnect_backoff(attempt: u32) -> Duration {
    let base = 2f64.powi(attempt.min(16) as i32);
    let capped = base.min(60.0);
    let jitter = 1.0 + 0.2 * ((f64::from(attempt) * 7.3).sin());
    Duration::from_secs_f64((capped * jitter).max(0.1))
}

/// Idempotent-request backoff: base 0.5 s doubling to a 30 s cap.
pub(crate) fn request_backoff(attempt: u32) -> Duration {
    let base = 0.5 * 2f64.powi(attempt.min(16) as i32);
    Duration::from_secs_f64(base.min(30.0))
}

enum ReadOutcome {
    Cancelled,
    AuthExpired,
    Disconnected,
}

/// Session task: connect, read until the socket drops, back off, repeat.
/// Runs until cancelled.
pub(crate) async fn run_session(client: ProtectClient, cancel: CancellationToken) {
    let mut attempt: u32 = 0;
    // ring resets flow back into the reader so all graph mutation stays on
    // this task
    let (ring_tx, mut ring_rx) = mpsc::channel::<String>(32);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        client.publish_state(ConnectionState::Connecting);
        match connect_socket(&client).await {
            Ok(socket) => {
                info!("websocket connected");
                client.publish_state(ConnectionState::Connected);
                attempt = 0;

                match read_loop(&client, socket, &cancel, &ring_tx, &mut ring_rx).await {
                    ReadOutcome::Cancelled => break,
                    ReadOutcome::AuthExpired => {
                        client.publish_state(ConnectionState::Authenticating);
                        if let Err(err) = client.login().await {
                            warn!(error = %err, "re-authentication failed");
                            client.publish_state(ConnectionState::Failed);
                            break;
                        }
                        continue;
                    }
                    ReadOutcome::Disconnected => {}
                }
            }
            Err(err) if err.is_auth_expired() => {
                client.publish_state(ConnectionState::Authenticating);
                if let Err(err) = client.login().await {
                    warn!(error = %err, "re-authentication failed");
                    client.publish_state(ConnectionState::Failed);
                    break;
                }
                continue;
            }
            Err(err) => {
                warn!(error = %err, attempt, "websocket connect failed");
            }
        }

        client.publish_state(ConnectionState::Reconnecting { attempt });
        let delay = reconnect_backoff(attempt);
        debug!(delay_ms = delay.as_millis() as u64, attempt, "waiting before reconnect");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }

    // a failed login leaves the terminal `Failed` state in place; only a
    // cooperative close reaches `Closed`
    if cancel.is_cancelled() {
        client.publish_state(ConnectionState::Closed);
    }
    debug!("session task exiting");
}

/// One socket lifetime: read frames until the stream drops or we are
/// cancelled. The reader performs no blocking I/O beyond the socket read.
async fn read_loop(
    client: &ProtectClient,
    socket: WsStream,
    cancel: &CancellationToken,
    ring_tx: &mpsc::Sender<String>,
    ring_rx: &mut mpsc::Receiver<String>,
) -> ReadOutcome {
    let (_write, mut read) = socket.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReadOutcome::Cancelled,
            expired = ring_rx.recv() => {
                if let Some(camera_id) = expired {
                    client.handle_ring_expiry(&camera_id).await;
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Binary(data))) => {
                        client.process_frame(&data, ring_tx).await;
                        if client.refresh_if_diverged().await {
                            // the replay position is gone; reconnect with
                            // the fresh lastUpdateId
                            return ReadOutcome::Disconnected;
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // tungstenite answers pings itself
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(frame) = &frame {
                            info!(code = %frame.code, reason = %frame.reason, "websocket closed by controller");
                            // an immediate close naming lastUpdateId means
                            // our resume position is invalid
                            if frame.reason.contains("lastUpdateId") {
                                client.force_refresh_soon();
                            }
                        }
                        return ReadOutcome::Disconnected;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket read error");
                        if is_unauthorized(&err) {
                            return ReadOutcome::AuthExpired;
                        }
                        return ReadOutcome::Disconnected;
                    }
                    None => {
                        info!("websocket stream ended");
                        return ReadOutcome::Disconnected;
                    }
                }
            }
        }
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Upgrades to the update socket, carrying the session cookies and the
/// current lastUpdateId so the controller replays from our checkpoint.
async fn connect_socket(client: &ProtectClient) -> Result<WsStream> {
    let url = client.ws_resume_url().await;
    debug!(url = %url, "connecting websocket");

    let mut request = url.as_str().into_client_request()?;
    if let Some(cookie) = client.cookie_header() {
        request.headers_mut().insert(
            "Cookie",
            cookie
                .parse()
                .map_err(|_| Error::Stream("invalid session cookie".to_string()))?,
        );
    }

    let (socket, response) = if client.verify_ssl() {
        connect_async(request).await.map_err(map_handshake_error)?
    } else {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;
        connect_async_tls_with_config(request, None, false, Some(Connector::NativeTls(tls)))
            .await
            .map_err(map_handshake_error)?
    };
    debug!(status = %response.status(), "websocket upgrade complete");

    Ok(socket)
}

fn map_handshake_error(error: tokio_tungstenite::tungstenite::Error) -> Error {
    if is_unauthorized(&error) {
        return Error::Auth("websocket upgrade rejected".to_string());
    }
    error.into()
}

fn is_unauthorized(error: &tokio_tungstenite::tungstenite::Error) -> bool {
    match error {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            response.status().as_u16() == 401
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_backoff_doubles_and_caps() {
        let d0 = reconnect_backoff(0);
        let d1 = reconnect_backoff(1);
        let d2 = reconnect_backoff(2);
        assert!(d1 > d0);
        assert!(d2 > d1);

        // jitter is +-20%, so the cap is at most 72s
        let d20 = reconnect_backoff(20);
        assert!(d20 <= Duration::from_secs(72));
        assert!(d20 >= Duration::from_secs(48));
    }

    #[test]
    fn reconnect_backoff_starts_near_one_second() {
        let d0 = reconnect_backoff(0);
        assert!(d0 >= Duration::from_millis(800));
        assert!(d0 <= Duration::from_millis(1200));
    }

    #[test]
    fn request_backoff_caps_at_thirty_seconds() {
        assert_eq!(request_backoff(0), Duration::from_millis(500));
        assert_eq!(request_backoff(1), Duration::from_secs(1));
        assert_eq!(request_backoff(10), Duration::from_secs(30));
    }

    #[test]
    fn state_equality() {
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 2 },
            ConnectionState::Reconnecting { attempt: 2 }
        );
        assert_ne!(ConnectionState::Connected, ConnectionState::Closed);
    }
}
