//! TCP record framing (RFC 5531 Record Marking Standard) and the
//! per-connection message pump.
//!
//! Each record is a sequence of fragments prefixed by a 4-byte header:
//! the top bit marks the last fragment, the low 31 bits carry the
//! fragment length. Records are fully reassembled before dispatch and
//! bounded by the configured `max_request_size`; an oversize record is a
//! transport error that drops the connection without an RPC reply.
//!
//! Completed records are handed to [`super::handle_rpc`] on their own
//! tasks. Replies are written back in the order handlers finish, which
//! is the only ordering the protocol requires of the server.

use std::io::Cursor;

use anyhow::anyhow;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::protocol::rpc::{self, Context};

/// Result type flowing from handler tasks back to the socket writer.
pub type SocketMessageType = Result<Vec<u8>, anyhow::Error>;

/// Reads one record-marked fragment, appending it to `append_to`.
/// Returns whether it carried the last-fragment flag.
async fn read_fragment(
    socket: &mut DuplexStream,
    append_to: &mut Vec<u8>,
    limit: usize,
) -> Result<bool, anyhow::Error> {
    let mut header_buf = [0_u8; 4];
    socket.read_exact(&mut header_buf).await?;
    let fragment_header = u32::from_be_bytes(header_buf);
    let is_last = (fragment_header & (1 << 31)) > 0;
    let length = (fragment_header & ((1 << 31) - 1)) as usize;
    trace!(length, is_last, "reading fragment");
    if append_to.len().saturating_add(length) > limit {
        return Err(anyhow!("RPC record length {} exceeds max {}", length, limit));
    }
    let start_offset = append_to.len();
    append_to.resize(start_offset + length, 0);
    socket.read_exact(&mut append_to[start_offset..]).await?;
    Ok(is_last)
}

/// Writes `buf` as record-marked fragments.
pub async fn write_fragment<W: AsyncWriteExt + Unpin>(
    socket: &mut W,
    buf: &[u8],
) -> Result<(), anyhow::Error> {
    const MAX_FRAGMENT_SIZE: usize = (1 << 31) - 1;

    let mut offset = 0;
    loop {
        let remaining = buf.len() - offset;
        let fragment_size = remaining.min(MAX_FRAGMENT_SIZE);
        let is_last = offset + fragment_size >= buf.len();
        let fragment_header =
            if is_last { fragment_size as u32 | (1 << 31) } else { fragment_size as u32 };

        socket.write_all(&u32::to_be_bytes(fragment_header)).await?;
        trace!(fragment_size, is_last, "writing fragment");
        socket.write_all(&buf[offset..offset + fragment_size]).await?;

        offset += fragment_size;
        if is_last {
            return Ok(());
        }
    }
}

/// Per-connection record pump: reassembles records from the socket feed
/// and dispatches each on its own task.
pub struct SocketMessageHandler {
    cur_fragment: Vec<u8>,
    socket_receive_channel: DuplexStream,
    context: Context,
    reply_send: mpsc::UnboundedSender<SocketMessageType>,
}

impl SocketMessageHandler {
    /// Builds the pump for a connection. Returns the handler itself, the
    /// write end the socket task feeds raw bytes into, and the channel
    /// completed replies arrive on.
    pub fn new(
        context: &Context,
    ) -> (Self, DuplexStream, mpsc::UnboundedReceiver<SocketMessageType>) {
        let (socksend, sockrecv) = tokio::io::duplex(256_000);
        let (reply_send, reply_recv) = mpsc::unbounded_channel();
        (
            Self {
                cur_fragment: Vec::new(),
                socket_receive_channel: sockrecv,
                context: context.clone(),
                reply_send,
            },
            socksend,
            reply_recv,
        )
    }

    /// Reads one fragment; on record completion spawns a handler task.
    /// Call in a loop until it errors (connection closed or oversize
    /// record).
    pub async fn read(&mut self) -> Result<(), anyhow::Error> {
        let limit = self.context.config.max_request_size;
        let is_last =
            read_fragment(&mut self.socket_receive_channel, &mut self.cur_fragment, limit).await?;
        if !is_last {
            return Ok(());
        }
        let record = std::mem::take(&mut self.cur_fragment);
        let mut context = self.context.clone();
        let reply_send = self.reply_send.clone();
        let load = context.load.track();
        tokio::spawn(async move {
            let _load = load;
            let mut input = Cursor::new(record);
            let mut output = Vec::new();
            match rpc::handle_rpc(&mut input, &mut output, &mut context).await {
                Ok(true) => {
                    let _ = reply_send.send(Ok(output));
                }
                Ok(false) => {
                    debug!("call consumed without a reply");
                }
                Err(e) => {
                    error!("RPC error: {e:?}");
                    let _ = reply_send.send(Err(e));
                }
            }
        });
        Ok(())
    }
}
