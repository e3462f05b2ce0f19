use crate::protocol::frame::{ParsedFrame, build_audio_frame, build_control_frame, decode_frame};
use crate::protocol::models::ControlRequest;
use crate::{Error, Result};

use super::transport::{BoxFuture, Transport};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_TRAILING_READS: usize = 8;

const FIRST_SEQUENCE: i32 = 1;
const RESULT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    ControlSent,
    Streaming,
    Completed,
    Failed,
}

impl SessionState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    const fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (from, Self::Failed) => !from.is_terminal(),
            (Self::Connecting, Self::ControlSent)
            | (Self::ControlSent, Self::Streaming)
            | (Self::Streaming, Self::Completed) => true,
            _ => false,
        }
    }
}

/// Parameters fixed for the lifetime of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub request: ControlRequest,
    pub chunk_size: usize,
    /// Longest wait for any single response frame.
    pub response_timeout: Duration,
    /// Reads allowed after the final audio frame before giving up on a
    /// final-flagged response.
    pub max_trailing_reads: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            request: ControlRequest::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_trailing_reads: DEFAULT_MAX_TRAILING_READS,
        }
    }
}

/// One recognition job bound to one socket.
///
/// Strict lockstep: every frame sent is answered by exactly one frame read
/// before the next is sent.
pub struct RecognitionSession {
    transport: Box<dyn Transport>,
    session_id: Uuid,
    settings: SessionSettings,
    sequence: i32,
    state: SessionState,
    final_sent: bool,
}

impl std::fmt::Debug for RecognitionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionSession")
            .field("session_id", &self.session_id)
            .field("sequence", &self.sequence)
            .field("state", &self.state)
            .field("final_sent", &self.final_sent)
            .finish_non_exhaustive()
    }
}

impl RecognitionSession {
    #[must_use]
    pub fn from_transport(
        transport: Box<dyn Transport>,
        session_id: Uuid,
        settings: SessionSettings,
    ) -> Self {
        Self {
            transport,
            session_id,
            settings,
            sequence: FIRST_SEQUENCE,
            state: SessionState::Connecting,
            final_sent: false,
        }
    }

    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Last sequence number used, always positive.
    #[must_use]
    pub const fn sequence(&self) -> i32 {
        self.sequence
    }

    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    fn advance(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::InvalidState {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(session_id = %self.session_id, from = ?self.state, to = ?next, "Session state change");
        self.state = next;
        Ok(())
    }

    fn mark_failed(&mut self, err: &Error) {
        if self.state.is_terminal() {
            return;
        }
        if matches!(err, Error::Cancelled) {
            tracing::info!(session_id = %self.session_id, "Recognition cancelled by caller");
        } else {
            tracing::error!(session_id = %self.session_id, error = %err, "Session failed");
        }
        self.state = SessionState::Failed;
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.mark_failed(err);
        }
        result
    }

    /// Send the control frame and read its response.
    ///
    /// # Errors
    /// Returns an error if the session is not fresh, the exchange fails, or the
    /// server answers with an error frame.
    pub async fn send_control(&mut self) -> Result<ParsedFrame> {
        let result = self.send_control_inner().await;
        self.track(result)
    }

    async fn send_control_inner(&mut self) -> Result<ParsedFrame> {
        if self.state != SessionState::Connecting {
            return Err(Error::InvalidState {
                from: self.state,
                to: SessionState::ControlSent,
            });
        }
        self.settings.request.validate()?;
        let frame = build_control_frame(&self.settings.request, self.sequence)?;
        self.transport.send(frame).await?;
        tracing::debug!(session_id = %self.session_id, sequence = self.sequence, "Sent control frame");
        self.advance(SessionState::ControlSent)?;
        self.receive_inner().await
    }

    /// Send one audio chunk without reading its response.
    ///
    /// # Errors
    /// Returns an error if no control frame was sent, the final chunk was
    /// already sent, or the send fails.
    pub async fn send_audio_frame(&mut self, chunk: &[u8], is_final: bool) -> Result<()> {
        let result = self.send_audio_frame_inner(chunk, is_final).await;
        self.track(result)
    }

    async fn send_audio_frame_inner(&mut self, chunk: &[u8], is_final: bool) -> Result<()> {
        if self.final_sent {
            return Err(Error::ProtocolViolation(
                "audio sent after the final chunk".to_string(),
            ));
        }
        match self.state {
            SessionState::ControlSent => self.advance(SessionState::Streaming)?,
            SessionState::Streaming => {}
            other => {
                return Err(Error::InvalidState {
                    from: other,
                    to: SessionState::Streaming,
                });
            }
        }

        let sequence = self
            .sequence
            .checked_add(1)
            .ok_or_else(|| Error::ProtocolViolation("sequence number overflow".to_string()))?;
        let frame = build_audio_frame(chunk, sequence, is_final)?;
        self.transport.send(frame).await?;
        self.sequence = sequence;
        self.final_sent = is_final;
        tracing::debug!(
            session_id = %self.session_id,
            sequence,
            len = chunk.len(),
            is_final,
            "Sent audio frame"
        );
        Ok(())
    }

    /// Send one audio chunk and read the matching response.
    ///
    /// # Errors
    /// See [`Self::send_audio_frame`] and [`Self::receive`].
    pub async fn send_audio(&mut self, chunk: &[u8], is_final: bool) -> Result<ParsedFrame> {
        self.send_audio_frame(chunk, is_final).await?;
        self.receive().await
    }

    /// Read and decode one response frame.
    ///
    /// # Errors
    /// Returns an error on timeout, transport failure, peer close, a decode
    /// failure, or a server error frame.
    pub async fn receive(&mut self) -> Result<ParsedFrame> {
        let result = self.receive_inner().await;
        self.track(result)
    }

    async fn receive_inner(&mut self) -> Result<ParsedFrame> {
        if self.state.is_terminal() {
            return Err(Error::InvalidState {
                from: self.state,
                to: self.state,
            });
        }

        let timeout = self.settings.response_timeout;
        let bytes = tokio::time::timeout(timeout, self.transport.next_frame())
            .await
            .map_err(|_| Error::Timeout(timeout))??
            .ok_or(Error::ConnectionClosed)?;
        let frame = decode_frame(&bytes)?;

        tracing::debug!(
            session_id = %self.session_id,
            message_type = ?frame.message_type(),
            sequence = ?frame.sequence,
            payload_length = ?frame.payload_length,
            is_last = frame.is_last_package,
            "Received frame"
        );
        if let Some(json) = frame.payload.as_ref().and_then(crate::Payload::as_json) {
            tracing::trace!(payload = %crate::trace_json(json), "Frame payload");
        }

        if let Some(server_error) = frame.server_error() {
            tracing::warn!(session_id = %self.session_id, code = server_error.code, "Server error frame");
            return Err(Error::Api(server_error));
        }

        if frame.is_last_package && self.state == SessionState::Streaming {
            self.advance(SessionState::Completed)?;
            tracing::info!(session_id = %self.session_id, sequence = self.sequence, "Recognition completed");
        }
        Ok(frame)
    }

    /// Release the socket. Idempotent; close errors are only logged.
    pub async fn close(&mut self) {
        if let Err(err) = self.transport.close().await {
            tracing::debug!(session_id = %self.session_id, error = %err, "Close failed");
        }
        tracing::info!(session_id = %self.session_id, state = ?self.state, "Session closed");
    }

    /// Run the whole job over one contiguous audio buffer.
    #[must_use]
    pub fn recognize(self, audio: Vec<u8>) -> RecognitionStream {
        self.recognize_stream(futures::stream::iter([audio]))
    }

    /// Run the whole job over audio arriving in arbitrary pieces.
    ///
    /// Pieces are re-cut to the configured chunk size; the final frame is sent
    /// once `audio` ends.
    pub fn recognize_stream<S>(self, audio: S) -> RecognitionStream
    where
        S: Stream<Item = Vec<u8>> + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        tokio::spawn(self.run(audio, tx));
        RecognitionStream { rx }
    }

    async fn run<S>(mut self, mut audio: S, tx: mpsc::Sender<Result<ParsedFrame>>)
    where
        S: Stream<Item = Vec<u8>> + Send + Unpin,
    {
        if let Err(err) = self.drive(&mut audio, &tx).await {
            self.mark_failed(&err);
            if !matches!(err, Error::Cancelled) {
                let _ = tx.send(Err(err)).await;
            }
        }
        self.close().await;
    }

    async fn drive<S>(&mut self, audio: &mut S, tx: &mpsc::Sender<Result<ParsedFrame>>) -> Result<()>
    where
        S: Stream<Item = Vec<u8>> + Send + Unpin,
    {
        let ack = self.send_control().await?;
        tracing::debug!(session_id = %self.session_id, ack_sequence = ?ack.ack_sequence, "Control acknowledged");

        let mut chunker = Chunker::new(self.settings.chunk_size);
        loop {
            let next = tokio::select! {
                () = tx.closed() => return Err(Error::Cancelled),
                next = audio.next() => next,
            };
            let Some(piece) = next else { break };
            chunker.push(&piece);
            while let Some(chunk) = chunker.pop_ready() {
                if self.exchange_chunk(&chunk, false, tx).await? {
                    return Ok(());
                }
            }
        }

        let last = chunker.finish();
        if self.exchange_chunk(&last, true, tx).await? {
            return Ok(());
        }

        for _ in 0..self.settings.max_trailing_reads {
            let frame = self.receive_or_cancel(tx).await?;
            if self.emit(frame, tx).await? {
                return Ok(());
            }
        }
        Err(Error::ProtocolViolation(format!(
            "no final response after {} additional reads",
            self.settings.max_trailing_reads
        )))
    }

    /// Send one chunk and forward its response. Returns `true` once complete.
    async fn exchange_chunk(
        &mut self,
        chunk: &[u8],
        is_final: bool,
        tx: &mpsc::Sender<Result<ParsedFrame>>,
    ) -> Result<bool> {
        if tx.is_closed() {
            return Err(Error::Cancelled);
        }
        self.send_audio_frame(chunk, is_final).await?;
        let frame = self.receive_or_cancel(tx).await?;
        self.emit(frame, tx).await
    }

    async fn receive_or_cancel(&mut self, tx: &mpsc::Sender<Result<ParsedFrame>>) -> Result<ParsedFrame> {
        tokio::select! {
            () = tx.closed() => Err(Error::Cancelled),
            frame = self.receive() => frame,
        }
    }

    async fn emit(&mut self, frame: ParsedFrame, tx: &mpsc::Sender<Result<ParsedFrame>>) -> Result<bool> {
        let done = self.state == SessionState::Completed;
        tx.send(Ok(frame)).await.map_err(|_| Error::Cancelled)?;
        Ok(done)
    }
}

/// Re-cuts incoming audio into fixed-size chunks, holding back the tail so
/// the last chunk can be marked final.
///
/// Chunks are split off the front of one `BytesMut`, so the bytes still
/// queued are never shifted.
struct Chunker {
    size: usize,
    buf: BytesMut,
}

impl Chunker {
    fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            buf: BytesMut::new(),
        }
    }

    fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    fn pop_ready(&mut self) -> Option<Bytes> {
        if self.buf.len() <= self.size {
            return None;
        }
        Some(self.buf.split_to(self.size).freeze())
    }

    fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Decoded responses of a running session.
///
/// Yields each response as it arrives, then ends after the final response or
/// after a single error. Dropping the stream cancels the session and closes
/// its socket.
pub struct RecognitionStream {
    rx: mpsc::Receiver<Result<ParsedFrame>>,
}

impl std::fmt::Debug for RecognitionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionStream").finish_non_exhaustive()
    }
}

impl Stream for RecognitionStream {
    type Item = Result<ParsedFrame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll_recv(cx)
    }
}

pub(super) struct WsTransport {
    pub(super) client: crate::SaucClient,
}

impl Transport for WsTransport {
    fn send(&mut self, frame: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.client.send_frame(frame).await })
    }

    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Vec<u8>>>> {
        Box::pin(async move { self.client.next_frame().await })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.client.close().await })
    }
}
