//! Point-to-point TCP transport.
//!
//! Every protocol message travels on its own connection as one
//! newline-terminated JSON line:
//!
//! - [`Messenger`]: connects to a roster peer, writes one message and, for
//!   heartbeat probes, waits for one reply on the same connection
//! - [`Listener`]: accepts connections, decodes one message each and hands it
//!   to the election engine without blocking it

pub mod listener;
pub mod messenger;

pub use listener::Listener;
pub use messenger::{DeliveryResult, Messenger};

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec};

use crate::election::Message;
use crate::error::{ElectionError, Result};

/// Longest accepted line. Every protocol message fits easily.
pub const MAX_FRAME_LEN: usize = 1024;

pub(crate) fn line_codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_FRAME_LEN)
}

/// Read and decode the next message on a framed connection.
pub(crate) async fn read_message<T>(framed: &mut Framed<T, LinesCodec>) -> Result<Message>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match framed.next().await {
        Some(line) => Message::decode(&line?),
        None => Err(ElectionError::EmptyFrame),
    }
}
