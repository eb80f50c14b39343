//! WebSocket listener. One thread per client pumps frames between the socket and
//! that client's connection loop.

use crate::config::AppConfig;
use crate::ipc::{run_connection, InboundFrame, Services, ServerMessage};
use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tungstenite::{Message, WebSocket};

/// How long a socket read waits before the pump checks for outbound replies.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Replies queued for one client before the connection loop waits for the socket.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Bind the configured address and serve clients until the listener fails.
pub fn serve(config: &AppConfig, services: Arc<Services>) -> Result<()> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).with_context(|| format!("failed to bind {addr}"))?;
    serve_listener(listener, services)
}

/// Serve clients from an already-bound listener.
pub fn serve_listener(listener: TcpListener, services: Arc<Services>) -> Result<()> {
    let local = listener
        .local_addr()
        .context("listener has no local address")?;
    log_debug(&format!("listening on ws://{local}"));
    tracing::info!(addr = %local, "listening");

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                log_debug(&format!("accept failed: {err}"));
                continue;
            }
        };
        let services = Arc::clone(&services);
        let spawned = thread::Builder::new()
            .name("deskremote-client".to_string())
            .spawn(move || {
                let peer = stream
                    .peer_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                log_debug(&format!("client connected: {peer}"));
                if let Err(err) = handle_client(stream, services) {
                    log_debug(&format!("client {peer} ended with error: {err:#}"));
                }
                log_debug(&format!("client disconnected: {peer}"));
            });
        if let Err(err) = spawned {
            log_debug(&format!("failed to spawn client thread: {err}"));
        }
    }
    Ok(())
}

fn handle_client(stream: TcpStream, services: Arc<Services>) -> Result<()> {
    let mut socket =
        tungstenite::accept(stream).map_err(|err| anyhow!("websocket handshake failed: {err}"))?;
    socket
        .get_ref()
        .set_read_timeout(Some(POLL_INTERVAL))
        .context("failed to set socket read timeout")?;

    let (inbound_tx, inbound_rx) = unbounded();
    let (outbound_tx, outbound_rx) = bounded(OUTBOUND_CAPACITY);
    let dispatcher = thread::Builder::new()
        .name("deskremote-dispatch".to_string())
        .spawn(move || run_connection(services, inbound_rx, outbound_tx))
        .context("failed to spawn connection loop")?;

    let result = pump(&mut socket, &inbound_tx, &outbound_rx);

    // Closing the inbound side ends the loop, which terminates this client's shells.
    // The outbound receiver goes too, so a loop blocked on a full queue wakes up.
    drop(inbound_tx);
    drop(outbound_rx);
    if dispatcher.join().is_err() {
        log_debug("connection loop panicked");
    }
    result
}

fn pump(
    socket: &mut WebSocket<TcpStream>,
    inbound: &Sender<InboundFrame>,
    outbound: &Receiver<ServerMessage>,
) -> Result<()> {
    loop {
        loop {
            match outbound.try_recv() {
                Ok(message) => {
                    let text =
                        serde_json::to_string(&message).context("failed to encode reply")?;
                    socket
                        .send(Message::Text(text))
                        .with_context(|| format!("failed to send {}", message.kind()))?;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }

        let frame = match socket.read() {
            Ok(Message::Text(text)) => InboundFrame::Text(text),
            Ok(Message::Binary(data)) => InboundFrame::Binary(data),
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => continue,
            Err(tungstenite::Error::Io(err)) if is_poll_timeout(&err) => continue,
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return Ok(())
            }
            Err(err) => return Err(err).context("websocket read failed"),
        };
        if inbound.send(frame).is_err() {
            return Ok(());
        }
    }
}

fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_timeouts_are_not_errors() {
        assert!(is_poll_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_poll_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_poll_timeout(&io::Error::from(
            io::ErrorKind::ConnectionReset
        )));
    }
}
