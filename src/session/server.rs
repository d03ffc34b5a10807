// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Line-oriented session server.
//!
//! Reads inbound messages one JSON object per line and writes outbound
//! events the same way. `conductor serve` runs it on stdin/stdout.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::events::EventBus;
use crate::workflow::Router;

use super::protocol::OutboundEvent;
use super::service::SessionService;

/// Serve one client session until `input` reaches EOF.
///
/// EOF cancels a running workflow; its `result` is still written before
/// this returns.
#[instrument(skip_all)]
pub async fn serve<R, W>(router: Arc<Router>, bus: Arc<EventBus>, input: R, output: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_events(rx, output));

    let mut service = SessionService::new(router, bus, tx);
    info!(session = %service.session_id().short(), "Session connected");
    service.connect();

    let mut lines = input.lines();
    let read_result = loop {
        match lines.next_line().await {
            Ok(Some(line)) => service.handle_line(&line),
            Ok(None) => break Ok(()),
            Err(e) => {
                warn!(error = %e, "Failed to read inbound message");
                break Err(e);
            }
        }
    };

    debug!("Input closed; shutting down session");
    service.shutdown().await;
    drop(service);

    let write_result = match writer.await {
        Ok(result) => result,
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
    };
    read_result.and(write_result)
}

async fn write_events<W>(mut rx: mpsc::UnboundedReceiver<OutboundEvent>, mut output: W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        let line = event
            .to_line()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}
