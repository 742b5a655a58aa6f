//! WebSocket push channel.
//!
//! Every accepted connection becomes one viewer. Events are written as JSON
//! text frames; anything the browser sends is ignored apart from Close.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::coordinator::Coordinator;
use crate::error::Result;

/// Accepts connections forever, one task per viewer.
pub async fn serve(coordinator: Arc<Coordinator>, listener: TcpListener) -> Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "accepting viewers");

    loop {
        let (stream, peer) = listener.accept().await?;
        let coordinator = Arc::clone(&coordinator);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(&coordinator, stream, peer).await {
                tracing::debug!(%peer, error = %e, "viewer connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    coordinator: &Coordinator,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    let mut viewer = coordinator.connect();
    let id = viewer.id();
    tracing::info!(%peer, viewer = %id, "viewer connected");

    let result = loop {
        tokio::select! {
            event = viewer.next() => match event {
                Some(event) => {
                    if let Err(e) = sink.send(Message::Text(event.to_json())).await {
                        break Err(e.into());
                    }
                }
                // Closed by the router, e.g. after falling behind
                None => break Ok(()),
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
        }
    };

    coordinator.disconnect(id);
    tracing::info!(%peer, viewer = %id, "viewer disconnected");

    result
}
