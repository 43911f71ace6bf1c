//! Client-side reconstruction of a relayed chat stream.
//!
//! [`RelayClient`] talks to the relay server; [`ChatSession`] owns the
//! transcript and folds arriving byte chunks into the in-progress
//! assistant entry, emitting an update event per chunk.

mod cancel;
mod decode;
mod error;
mod events;
mod session;
mod transport;

pub use cancel::{CancelHandle, CancelToken};
pub use decode::Utf8Decoder;
pub use error::ClientError;
pub use events::UpdateEvent;
pub use session::ChatSession;
pub use transport::{ByteStream, RelayClient};
