use crate::Result;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A duplex channel that carries whole binary frames.
///
/// `send` must write the frame as one unit or not at all.
pub trait Transport: Send {
    fn send(&mut self, frame: Vec<u8>) -> BoxFuture<'_, Result<()>>;
    /// Next inbound frame, or `None` once the peer has closed.
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Vec<u8>>>>;
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}
