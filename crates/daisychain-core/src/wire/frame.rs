//! Message boundaries.
//!
//! Two modes, selected by [`Framing`]:
//!
//! ```text
//! raw:             <UTF-8 JSON document>
//! length-prefixed: [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Raw mode has no explicit boundary. A buffer is taken as one message once
//! it parses as a complete JSON document, or once it is clearly not JSON.
//! Only a buffer that ends mid-document waits for more bytes.

use crate::config::Framing;
use crate::{DaisyError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const PREFIX_LEN: usize = 4;

/// Wrap `payload` for the wire.
pub fn encode(framing: Framing, payload: &[u8]) -> Vec<u8> {
    match framing {
        Framing::Raw => payload.to_vec(),
        Framing::LengthPrefixed => {
            let mut out = Vec::with_capacity(PREFIX_LEN + payload.len());
            out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            out.extend_from_slice(payload);
            out
        }
    }
}

/// Take the next complete message out of `buf`.
///
/// Returns `None` while the buffered bytes are still incomplete.
pub fn decode(framing: Framing, buf: &mut Vec<u8>, max_message_size: usize) -> Result<Option<Vec<u8>>> {
    match framing {
        Framing::Raw => {
            if buf.is_empty() {
                return Ok(None);
            }
            if !raw_document_incomplete(buf) {
                return Ok(Some(std::mem::take(buf)));
            }
            if buf.len() > max_message_size {
                return Err(DaisyError::MessageTooLarge {
                    size: buf.len(),
                    max: max_message_size,
                });
            }
            Ok(None)
        }
        Framing::LengthPrefixed => {
            if buf.len() < PREFIX_LEN {
                return Ok(None);
            }
            let mut len_buf = [0u8; PREFIX_LEN];
            len_buf.copy_from_slice(&buf[..PREFIX_LEN]);
            let len = u32::from_be_bytes(len_buf) as usize;

            if len > max_message_size {
                return Err(DaisyError::MessageTooLarge {
                    size: len,
                    max: max_message_size,
                });
            }
            if buf.len() < PREFIX_LEN + len {
                return Ok(None);
            }

            let payload = buf[PREFIX_LEN..PREFIX_LEN + len].to_vec();
            buf.drain(..PREFIX_LEN + len);
            Ok(Some(payload))
        }
    }
}

fn raw_document_incomplete(buf: &[u8]) -> bool {
    match serde_json::from_slice::<serde::de::IgnoredAny>(buf) {
        Ok(_) => false,
        Err(e) => e.is_eof(),
    }
}

/// Write one message to an async writer.
pub async fn write_message<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    framing: Framing,
    payload: &[u8],
) -> Result<()> {
    writer.write_all(&encode(framing, payload)).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message from an async reader.
///
/// Returns `None` on clean EOF before any byte arrived. A raw message cut
/// short by EOF is returned as is and fails later as JSON.
pub async fn read_message<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    framing: Framing,
    chunk_size: usize,
    max_message_size: usize,
) -> Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; chunk_size.max(1)];

    loop {
        if let Some(message) = decode(framing, &mut buf, max_message_size)? {
            return Ok(Some(message));
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return match framing {
                Framing::Raw => Ok(Some(buf)),
                Framing::LengthPrefixed => Err(DaisyError::Io {
                    message: format!("connection closed inside a frame ({} bytes buffered)", buf.len()),
                    source: None,
                }),
            };
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
