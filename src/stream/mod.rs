//! Incremental response decoding
//!
//! - [`decoder`] turns fragments of the `data: <json>` line protocol into
//!   [`StreamEvent`]s.
//! - [`reader`] drives the decoder from a transport byte stream while
//!   honouring a cancellation token.

pub mod decoder;
pub mod reader;

pub use decoder::{LineBuffer, StreamDecoder, StreamEvent};
pub use reader::{decode_stream, ByteStream, EventStream};
