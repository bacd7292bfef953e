//! Response stream processing.
//!
//! ```text
//! HTTP body bytes → decode_stream → DecodedEvent (Delta / Error / Done)
//! ```
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`decode`] | Line-buffered `data:` event decoder |

pub mod decode;

pub use decode::{decode_line, decode_stream, DecodedEvent, StreamDecoder, DATA_PREFIX, DONE_SIGNAL};
