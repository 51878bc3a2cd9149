//! The DSI multiplexer: a duplex, multiplexed transport over one TCP
//! stream. See `task.rs` for the spawned send/receive loop.

mod task;

use bytes::Bytes;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::codec::Cursor;
use crate::command::Command;
use crate::dsi::DsiOpcode;
use crate::error::Error;
use crate::reply::Reply;
use crate::result::AfpResultCode;
use task::{read_frame, write_frame, ConnectionTask, Inbound, Submission};

const ATTENTION_CHANNEL_CAPACITY: usize = 32;

/// DSI_OPEN_SESSION option tags, per §4.2.
const OPTION_REQUEST_QUANTA: u8 = 0x00;
const OPTION_SERVER_REPLAY_CACHE_SIZE: u8 = 0x02;

/// A connected-but-not-yet-multiplexed socket: past the DSI_OPEN_SESSION
/// handshake, but before the send/receive pipelines are spawned. `Server`
/// drives the login exchange (`LOGIN`/`LOGIN_CONT`) through this type's
/// synchronous helpers, matching the Open Question resolution that sync
/// bootstrap calls are only valid before the multiplexer task exists.
pub struct PendingConnection {
    stream: TcpStream,
    next_request_id: u16,
    quanta: u32,
    replay_cache_size: u32,
}

impl PendingConnection {
    pub async fn open(addr: impl ToSocketAddrs) -> Result<Self, Error> {
        let mut stream = TcpStream::connect(addr).await?;
        let mut next_request_id: u16 = 0;

        let open_cmd_id = next_request_id;
        next_request_id = next_request_id.wrapping_add(1);
        let header = crate::dsi::DsiHeader {
            flags: crate::dsi::DsiFlags::Request,
            command: DsiOpcode::OpenSession,
            request_id: open_cmd_id,
            error_or_offset: 0,
            total_data_length: 0,
            reserved: 0,
        };
        let framed = task::Framed {
            header,
            body: Bytes::new(),
            trailing: None,
        };
        write_frame(&mut stream, &framed).await?;

        let (_reply_header, payload) = read_frame(&mut stream).await?;
        let (quanta, replay_cache_size) = parse_open_session_options(&payload)?;

        Ok(Self {
            stream,
            next_request_id,
            quanta,
            replay_cache_size,
        })
    }

    pub fn quanta(&self) -> u32 {
        self.quanta
    }

    pub fn replay_cache_size(&self) -> u32 {
        self.replay_cache_size
    }

    /// Send one command without waiting for its reply. Valid only while the
    /// multiplexer task has not been spawned (single outstanding request at
    /// a time, no `pending` bookkeeping).
    pub async fn send_command_sync(&mut self, cmd: Command) -> Result<(), Error> {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let framed = task::frame_command(id, cmd);
        write_frame(&mut self.stream, &framed).await?;
        Ok(())
    }

    /// Read the next reply frame off the socket, matching it to whatever
    /// request was last sent via `send_command_sync`.
    pub async fn read_reply_sync(&mut self) -> Result<Reply, Error> {
        let (header, payload) = read_frame(&mut self.stream).await?;
        let result_code = AfpResultCode::from_i32(header.error_or_offset as i32);
        Ok(Reply::new(result_code, payload))
    }

    /// Spawn the multiplexer task and return the live, pipelined handle.
    /// After this call there is no way back to the sync helpers.
    pub fn into_connection(self) -> Connection {
        let (tx, rx) = mpsc::unbounded_channel();
        let (attention_tx, _) = broadcast::channel(ATTENTION_CHANNEL_CAPACITY);
        let task = ConnectionTask::new(self.stream, self.next_request_id, rx, attention_tx.clone());
        tokio::spawn(task.run());
        Connection {
            to_task: tx,
            attention_tx,
            quanta: self.quanta,
            replay_cache_size: self.replay_cache_size,
        }
    }
}

fn parse_open_session_options(payload: &Bytes) -> Result<(u32, u32), Error> {
    let mut c = Cursor::new(payload.clone());
    let mut quanta = 0u32;
    let mut replay_cache_size = 0u32;
    while c.remaining() > 0 {
        let option_type = c.read_u8()?;
        let option_length = c.read_u8()? as usize;
        let value = c.read_raw(option_length)?;
        match option_type {
            OPTION_REQUEST_QUANTA => {
                if value.len() == 4 {
                    quanta = u32::from_be_bytes(value[..4].try_into().unwrap());
                }
            }
            OPTION_SERVER_REPLAY_CACHE_SIZE => {
                if value.len() == 4 {
                    replay_cache_size = u32::from_be_bytes(value[..4].try_into().unwrap());
                }
            }
            _ => {}
        }
    }
    Ok((quanta, replay_cache_size))
}

/// The live, multiplexed DSI connection. Cloning shares the same underlying
/// socket and task (it is a cheap handle, like the teacher's `SftpClient`).
#[derive(Clone)]
pub struct Connection {
    to_task: mpsc::UnboundedSender<Inbound>,
    attention_tx: broadcast::Sender<u32>,
    quanta: u32,
    replay_cache_size: u32,
}

impl Connection {
    pub fn quanta(&self) -> u32 {
        self.quanta
    }

    pub fn replay_cache_size(&self) -> u32 {
        self.replay_cache_size
    }

    /// Subscribe to server-initiated ATTENTION notifications. The payload
    /// is the raw `error_or_offset` word the server sent.
    pub fn subscribe_attention(&self) -> broadcast::Receiver<u32> {
        self.attention_tx.subscribe()
    }

    /// Submit a command and await its reply. Completes with `ConnectionClosed`
    /// if the transport has already failed, `Cancelled` if `cancel` fires,
    /// or the decoded `Reply` otherwise.
    pub async fn queue_command(&self, cmd: Command, cancel: CancellationToken) -> Result<Reply, Error> {
        let (tx, rx) = oneshot::channel();
        let submission = Submission {
            cmd,
            cancel,
            completer: tx,
        };
        self.to_task
            .send(Inbound::Submit(submission))
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Convenience for fire-and-forget commands with no cancellation need.
    pub async fn send(&self, cmd: Command) -> Result<Reply, Error> {
        self.queue_command(cmd, CancellationToken::new()).await
    }

    /// Issue `CLOSE_SESSION` and tear down the multiplexer task. Idempotent:
    /// a second call simply finds the channel already closed.
    pub fn close(&self) {
        let _ = self.to_task.send(Inbound::Close);
    }
}
