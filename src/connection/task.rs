//! The DSI multiplexer loop and the raw frame I/O it (and the pre-login
//! bootstrap in `mod.rs`) share.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::dsi::{DsiFlags, DsiHeader, DsiOpcode, HEADER_LEN};
use crate::error::Error;
use crate::reply::Reply;
use crate::result::AfpResultCode;

/// A fully framed, ready-to-write request: header plus the command body
/// plus (for writes) the trailing data segment.
pub(crate) struct Framed {
    pub header: DsiHeader,
    pub body: Bytes,
    pub trailing: Option<Bytes>,
}

pub(crate) fn frame_command(request_id: u16, cmd: Command) -> Framed {
    let cmd_type = cmd.command_type();
    let (opcode, write_offset) = cmd_type.dsi_framing();
    let (body, trailing) = cmd.into_parts();
    let total_data_length = body.len() as u32 + trailing.as_ref().map_or(0, |t| t.len() as u32);
    let header = DsiHeader {
        flags: DsiFlags::Request,
        command: opcode,
        request_id,
        error_or_offset: write_offset,
        total_data_length,
        reserved: 0,
    };
    Framed {
        header,
        body,
        trailing,
    }
}

pub(crate) fn frame_tickle(request_id: u16) -> Framed {
    Framed {
        header: DsiHeader {
            flags: DsiFlags::Request,
            command: DsiOpcode::Tickle,
            request_id,
            error_or_offset: 0,
            total_data_length: 0,
            reserved: 0,
        },
        body: Bytes::new(),
        trailing: None,
    }
}

pub(crate) fn frame_close_session(request_id: u16) -> Framed {
    Framed {
        header: DsiHeader {
            flags: DsiFlags::Request,
            command: DsiOpcode::CloseSession,
            request_id,
            error_or_offset: 0,
            total_data_length: 0,
            reserved: 0,
        },
        body: Bytes::new(),
        trailing: None,
    }
}

/// Write one DSI frame. `write_all` already retries on short writes, which
/// is the resumption behavior §5 asks for.
pub(crate) async fn write_frame<W: AsyncWriteExt + Unpin>(
    w: &mut W,
    framed: &Framed,
) -> Result<(), std::io::Error> {
    w.write_all(&framed.header.encode_bytes()).await?;
    w.write_all(&framed.body).await?;
    if let Some(trailing) = &framed.trailing {
        w.write_all(trailing).await?;
    }
    Ok(())
}

/// Read one DSI frame: header, then its payload (if `totalDataLength > 0`).
pub(crate) async fn read_frame<R: AsyncReadExt + Unpin>(
    r: &mut R,
) -> Result<(DsiHeader, Bytes), std::io::Error> {
    let mut header_buf = [0u8; HEADER_LEN];
    r.read_exact(&mut header_buf).await?;
    let header = DsiHeader::decode_bytes(header_buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let payload = if header.total_data_length > 0 {
        let mut buf = vec![0u8; header.total_data_length as usize];
        r.read_exact(&mut buf).await?;
        Bytes::from(buf)
    } else {
        Bytes::new()
    };
    Ok((header, payload))
}

pub(crate) struct Submission {
    pub cmd: Command,
    pub cancel: CancellationToken,
    pub completer: oneshot::Sender<Result<Reply, Error>>,
}

/// What arrives on the task's incoming channel: either a command to
/// multiplex, or a request to issue `CLOSE_SESSION` and shut down.
pub(crate) enum Inbound {
    Submit(Submission),
    Close,
}

enum QueueSlot {
    Tickle,
    User(Submission),
    Close,
}

struct PendingEntry {
    /// `None` once the caller has cancelled and been notified; the entry is
    /// kept around only so the eventual reply can be silently discarded.
    completer: Option<oneshot::Sender<Result<Reply, Error>>>,
}

/// Drives the send queue and the socket read loop from one task, matching
/// the single-threaded-cooperative model of §5: two conceptual pipelines,
/// one executor.
pub(crate) struct ConnectionTask {
    stream: TcpStream,
    next_request_id: u16,
    queue: VecDeque<QueueSlot>,
    pending: HashMap<u16, PendingEntry>,
    incoming: mpsc::UnboundedReceiver<Inbound>,
    attention_tx: broadcast::Sender<u32>,
}

type CancelWatch = Pin<Box<dyn std::future::Future<Output = u16> + Send>>;

impl ConnectionTask {
    pub(crate) fn new(
        stream: TcpStream,
        next_request_id: u16,
        incoming: mpsc::UnboundedReceiver<Inbound>,
        attention_tx: broadcast::Sender<u32>,
    ) -> Self {
        Self {
            stream,
            next_request_id,
            queue: VecDeque::new(),
            pending: HashMap::new(),
            incoming,
            attention_tx,
        }
    }

    fn allocate_request_id(&mut self) -> u16 {
        loop {
            let id = self.next_request_id;
            self.next_request_id = self.next_request_id.wrapping_add(1);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    pub(crate) async fn run(mut self) {
        let mut cancel_watches: FuturesUnordered<CancelWatch> = FuturesUnordered::new();

        loop {
            tokio::select! {
                biased;

                submission = self.incoming.recv() => {
                    match submission {
                        Some(Inbound::Submit(sub)) => self.queue.push_back(QueueSlot::User(sub)),
                        Some(Inbound::Close) => self.queue.push_back(QueueSlot::Close),
                        None => {
                            // Sender dropped: no more new work, but finish
                            // draining what's pending.
                            if self.pending.is_empty() && self.queue.is_empty() {
                                return;
                            }
                        }
                    }
                }

                _ = async {}, if !self.queue.is_empty() => {
                    if let Some(slot) = self.queue.pop_front() {
                        self.send_one(slot, &mut cancel_watches).await;
                    }
                }

                frame = read_frame(&mut self.stream) => {
                    match frame {
                        Ok((header, payload)) => self.dispatch_reply(header, payload).await,
                        Err(err) => {
                            self.fail_all(Error::from(err));
                            return;
                        }
                    }
                }

                Some(cancelled_id) = cancel_watches.next() => {
                    if let Some(entry) = self.pending.get_mut(&cancelled_id) {
                        if let Some(completer) = entry.completer.take() {
                            let _ = completer.send(Err(Error::Cancelled));
                        }
                    }
                }
            }
        }
    }

    async fn send_one(&mut self, slot: QueueSlot, cancel_watches: &mut FuturesUnordered<CancelWatch>) {
        match slot {
            QueueSlot::Close => {
                let id = self.allocate_request_id();
                let framed = frame_close_session(id);
                let _ = write_frame(&mut self.stream, &framed).await;
                self.fail_all(Error::ConnectionClosed);
                self.incoming.close();
            }
            QueueSlot::Tickle => {
                let id = self.allocate_request_id();
                let framed = frame_tickle(id);
                if let Err(err) = write_frame(&mut self.stream, &framed).await {
                    self.fail_all(Error::from(err));
                }
            }
            QueueSlot::User(sub) => {
                if sub.cancel.is_cancelled() {
                    let _ = sub.completer.send(Err(Error::Cancelled));
                    return;
                }
                let id = self.allocate_request_id();
                let framed = frame_command(id, sub.cmd);
                if let Err(err) = write_frame(&mut self.stream, &framed).await {
                    let _ = sub.completer.send(Err(Error::TransportError(
                        std::io::Error::new(err.kind(), err.to_string()),
                    )));
                    self.fail_all(Error::from(err));
                    return;
                }
                self.pending.insert(
                    id,
                    PendingEntry {
                        completer: Some(sub.completer),
                    },
                );
                let cancel = sub.cancel;
                cancel_watches.push(Box::pin(async move {
                    cancel.cancelled().await;
                    id
                }));
            }
        }
    }

    async fn dispatch_reply(&mut self, header: DsiHeader, payload: Bytes) {
        match header.command {
            DsiOpcode::Tickle => {
                tracing::debug!(request_id = header.request_id, "tickle received, replying");
                self.queue.push_front(QueueSlot::Tickle);
            }
            DsiOpcode::Command | DsiOpcode::Write => {
                if let Some(entry) = self.pending.remove(&header.request_id) {
                    if let Some(completer) = entry.completer {
                        let result_code = AfpResultCode::from_i32(header.error_or_offset as i32);
                        let _ = completer.send(Ok(Reply::new(result_code, payload)));
                    }
                } else {
                    tracing::trace!(
                        request_id = header.request_id,
                        "discarding reply for unknown or cancelled request"
                    );
                }
            }
            other => {
                tracing::debug!(?other, "server attention notification");
                let _ = self.attention_tx.send(header.error_or_offset);
            }
        }
    }

    fn fail_all(&mut self, err: Error) {
        for (_, entry) in self.pending.drain() {
            if let Some(completer) = entry.completer {
                let _ = completer.send(Err(clone_error(&err)));
            }
        }
        for slot in self.queue.drain(..) {
            if let QueueSlot::User(sub) = slot {
                let _ = sub.completer.send(Err(clone_error(&err)));
            }
        }
    }
}

/// `Error` doesn't implement `Clone` (it wraps `std::io::Error`); failing
/// every outstanding caller with "the same" error means re-describing it.
fn clone_error(err: &Error) -> Error {
    match err {
        Error::ConnectionClosed => Error::ConnectionClosed,
        Error::TransportError(io_err) => {
            Error::TransportError(std::io::Error::new(io_err.kind(), io_err.to_string()))
        }
        _ => Error::ConnectionClosed,
    }
}
