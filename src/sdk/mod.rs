//! Streaming recognition sessions over the framing in `crate::protocol`.
//!
//! [`Recognizer`] opens sockets; [`RecognitionSession`] drives one job in
//! lockstep and can be used frame by frame or as a [`RecognitionStream`].

mod builder;
mod session;
mod transport;

pub use builder::{Recognizer, RecognizerBuilder};
pub use session::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_TRAILING_READS, DEFAULT_RESPONSE_TIMEOUT, RecognitionSession,
    RecognitionStream, SessionSettings, SessionState,
};
pub use transport::{BoxFuture, Transport};
