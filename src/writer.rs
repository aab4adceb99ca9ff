//! Dedicated writer task serializing outbound messages.
//!
//! The client side can have several callers sending requests concurrently
//! while the read loop owns the other half of the stream. Instead of a
//! mutex around the write half, encoded messages go through an mpsc channel
//! to a single writer task:
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<Bytes> ─► Writer Task ─► Stream
//! Caller N ─┘
//! ```

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{DiameterError, Result};

/// Channel capacity for the outbound message queue.
const CHANNEL_CAPACITY: usize = 64;

/// Handle for sending encoded messages to the writer task.
///
/// Cheaply cloneable. Dropping every handle shuts the writer task down
/// cleanly once the queue drains.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue an encoded message for writing.
    ///
    /// Fails with `ConnectionClosed` once the writer task has terminated.
    pub async fn send(&self, message: Bytes) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| DiameterError::ConnectionClosed)
    }
}

/// Spawn the writer task and return a handle for sending messages.
pub fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Writer loop: receives encoded messages and writes each one fully before
/// taking the next.
async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        writer.write_all(&message).await?;
        writer.flush().await?;
    }
    // Channel closed, clean shutdown.
    Ok(())
}
