use super::channel_manager::{ChannelError, Connector, Link, LinkEvent, LinkEventKind, LinkTarget};
use super::endpoint::Endpoint;
use crate::{error, event, log, warn};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Socket transport: length-prefixed frames (`u32` big endian) over TCP or local sockets.
/// Connecting endpoints retry forever on a fixed interval, listening endpoints serve one
/// peer at a time.
pub struct SocketConnector {
    retry_interval: Duration,
}

impl SocketConnector {
    /// Upper bound for a single frame, larger length prefixes drop the connection.
    const MAX_FRAME_LEN: u32 = 1 << 20;

    pub fn new(retry_interval: Duration) -> Self { Self { retry_interval } }

    /// Waits `retry`, returns `true` if the link was shut down meanwhile.
    async fn pause(cancel: &CancellationToken, retry: Duration) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => true,
            () = tokio::time::sleep(retry) => false,
        }
    }

    /// Link task. Connecting and waiting are abandoned as soon as `cancel` fires, a running
    /// connection is left to deliver the outbound frames queued before shutdown.
    async fn run(
        target: LinkTarget,
        events: mpsc::UnboundedSender<LinkEvent>,
        mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
        retry: Duration,
        cancel: CancellationToken,
    ) {
        match target.endpoint.clone() {
            Endpoint::Listen(addr) => {
                let listener = loop {
                    let bound = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return,
                        res = TcpListener::bind(&addr) => res,
                    };
                    match bound {
                        Ok(listener) => break listener,
                        Err(e) => error!("Channel {} cannot listen on {addr}: {e}", target.channel),
                    }
                    if Self::pause(&cancel, retry).await {
                        return;
                    }
                };
                loop {
                    let accepted = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return,
                        res = listener.accept() => res,
                    };
                    match accepted {
                        Ok((socket, peer)) => {
                            log!("Channel {} accepted peer {peer}", target.channel);
                            Self::serve(socket, &target, &events, &mut outbound).await;
                            if cancel.is_cancelled() {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("Channel {} failed to accept: {e}", target.channel);
                            if Self::pause(&cancel, retry).await {
                                return;
                            }
                        }
                    }
                }
            }
            Endpoint::Tcp(addr) => loop {
                let attempt = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    res = TcpStream::connect(&addr) => res,
                };
                match attempt {
                    Ok(socket) => Self::serve(socket, &target, &events, &mut outbound).await,
                    Err(e) => event!("Channel {} connect to {addr} failed: {e}", target.channel),
                }
                if Self::pause(&cancel, retry).await {
                    return;
                }
            },
            #[cfg(unix)]
            Endpoint::Unix(path) => loop {
                let attempt = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    res = tokio::net::UnixStream::connect(&path) => res,
                };
                match attempt {
                    Ok(socket) => Self::serve(socket, &target, &events, &mut outbound).await,
                    Err(e) => {
                        event!("Channel {} connect to {} failed: {e}", target.channel, path.display());
                    }
                }
                if Self::pause(&cancel, retry).await {
                    return;
                }
            },
            #[cfg(not(unix))]
            Endpoint::Unix(path) => {
                error!("Channel {}: local sockets unsupported ({})", target.channel, path.display());
            }
        }
    }

    async fn serve<S>(
        socket: S,
        target: &LinkTarget,
        events: &mpsc::UnboundedSender<LinkEvent>,
        outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let _ = events.send(target.event(LinkEventKind::Connected));
        let (mut rx_socket, mut tx_socket) = tokio::io::split(socket);

        let result = tokio::select! {
            res = Self::handle_connection_rx(&mut rx_socket, target, events) => res,
            res = Self::handle_connection_tx(&mut tx_socket, outbound) => res,
        };

        let _ = events.send(target.event(LinkEventKind::Disconnected));
        match result {
            Err(e)
                if e.kind() == ErrorKind::UnexpectedEof
                    || e.kind() == ErrorKind::ConnectionReset
                    || e.kind() == ErrorKind::ConnectionAborted => {}
            Err(e) => warn!("Closing channel {} connection due to {e:?}", target.channel),
            Ok(()) => {}
        }
        let _ = tx_socket.shutdown().await;
    }

    async fn handle_connection_rx<S: AsyncRead>(
        socket: &mut ReadHalf<S>,
        target: &LinkTarget,
        events: &mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<(), std::io::Error> {
        loop {
            let length = socket.read_u32().await?;
            if length > Self::MAX_FRAME_LEN {
                return Err(std::io::Error::new(
                    ErrorKind::InvalidData,
                    format!("frame of {length} bytes exceeds limit"),
                ));
            }
            let mut buffer = vec![0u8; length as usize];
            socket.read_exact(&mut buffer).await?;
            if events.send(target.event(LinkEventKind::Frame(buffer))).is_err() {
                return Ok(());
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn handle_connection_tx<S: AsyncWrite>(
        socket: &mut WriteHalf<S>,
        outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Result<(), std::io::Error> {
        while let Some(frame) = outbound.recv().await {
            socket.write_u32(frame.len() as u32).await?;
            socket.write_all(&frame).await?;
            socket.flush().await?;
        }
        Ok(())
    }
}

impl Connector for SocketConnector {
    fn connect(&self, target: LinkTarget, events: mpsc::UnboundedSender<LinkEvent>) -> Box<dyn Link> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let retry = self.retry_interval;
        tokio::spawn(Self::run(target, events, outbound_rx, retry, cancel.clone()));
        Box::new(SocketLink { outbound: Some(outbound_tx), cancel })
    }
}

/// Handle to a running link task. Shutting down closes the outbound queue, so a connected
/// peer still receives every frame transmitted before, then the connection ends.
struct SocketLink {
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    cancel: CancellationToken,
}

impl Link for SocketLink {
    fn transmit(&mut self, frame: Vec<u8>) -> Result<(), ChannelError> {
        let outbound = self.outbound.as_ref().ok_or(ChannelError::LinkClosed)?;
        outbound.send(frame).map_err(|_| ChannelError::LinkClosed)
    }

    fn shutdown(&mut self) {
        self.outbound = None;
        self.cancel.cancel();
    }
}

impl Drop for SocketLink {
    fn drop(&mut self) { self.shutdown(); }
}
