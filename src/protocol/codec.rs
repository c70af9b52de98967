//! Length-prefixed request/response codec.
//!
//! Both halves of the protocol live here: the server reads requests and
//! writes responses, the client writes requests and reads responses.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::outcome::OutcomeCode;

/// Single payload byte that, with a length of 1, ends the session.
pub const QUIT_BYTE: u8 = b'q';

/// Size of the request and text length prefixes.
pub const LENGTH_PREFIX_LEN: usize = 8;

/// Size of the outcome code that opens every response.
pub const OUTCOME_LEN: usize = 4;

/// Errors produced while reading or writing protocol frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The peer closed the connection on a frame boundary.
    #[error("connection closed by peer")]
    Closed,

    /// The peer closed the connection inside a frame.
    #[error("truncated {what}: expected {expected} bytes, received {received}")]
    Truncated {
        what: &'static str,
        expected: usize,
        received: usize,
    },

    /// The outcome code is not one of the known values.
    #[error("unknown outcome code {0}")]
    UnknownOutcome(i32),

    /// A response announced more text than the reader accepts.
    #[error("response text of {len} bytes exceeds limit of {limit}")]
    TextTooLong { len: u64, limit: u64 },

    /// Response text was not UTF-8.
    #[error("response text is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Underlying socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Header of an image request.
///
/// For a one-byte payload the byte has already been read to rule out the
/// termination signal, so it travels in `lead_byte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Declared payload length.
    pub len: u64,
    /// Payload byte consumed while checking for the termination signal.
    pub lead_byte: Option<u8>,
}

impl ImageHeader {
    /// Bytes still waiting on the connection.
    pub fn remaining(&self) -> u64 {
        self.len - self.lead_byte.map_or(0, |_| 1)
    }
}

/// A decoded client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// The termination signal.
    Quit,
    /// An image whose payload is still on the wire.
    Image(ImageHeader),
}

/// A server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Success(String),
    Failure,
    Timeout,
    RateLimitExceeded,
    ServerBusy,
}

impl Response {
    /// Outcome code for this response.
    pub fn code(&self) -> OutcomeCode {
        match self {
            Response::Success(_) => OutcomeCode::Success,
            Response::Failure => OutcomeCode::Failure,
            Response::Timeout => OutcomeCode::Timeout,
            Response::RateLimitExceeded => OutcomeCode::RateLimitExceeded,
            Response::ServerBusy => OutcomeCode::ServerBusy,
        }
    }

    /// Encode into a single buffer so the response goes out in one write.
    pub fn encode(&self) -> Vec<u8> {
        let code = self.code().as_i32().to_le_bytes();
        match self {
            Response::Success(text) => {
                let mut buf = Vec::with_capacity(OUTCOME_LEN + LENGTH_PREFIX_LEN + text.len());
                buf.extend_from_slice(&code);
                buf.extend_from_slice(&(text.len() as u64).to_le_bytes());
                buf.extend_from_slice(text.as_bytes());
                buf
            }
            _ => code.to_vec(),
        }
    }
}

/// Fill `buf`, starting at `filled`, treating EOF as truncation.
async fn read_rest<R>(
    reader: &mut R,
    buf: &mut [u8],
    mut filled: usize,
    what: &'static str,
) -> Result<(), CodecError>
where
    R: AsyncRead + Unpin,
{
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(CodecError::Truncated {
                what,
                expected: buf.len(),
                received: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Fill a frame head; EOF before the first byte is a clean close.
async fn read_head<R>(reader: &mut R, buf: &mut [u8], what: &'static str) -> Result<(), CodecError>
where
    R: AsyncRead + Unpin,
{
    let first = reader.read(buf).await?;
    if first == 0 {
        return Err(CodecError::Closed);
    }
    read_rest(reader, buf, first, what).await
}

/// Read the next request header from a client.
///
/// Image payload bytes are left on the connection for the caller to stream.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    read_head(reader, &mut prefix, "length prefix").await?;
    let len = u64::from_le_bytes(prefix);

    if len != 1 {
        return Ok(Request::Image(ImageHeader { len, lead_byte: None }));
    }

    let mut byte = [0u8; 1];
    read_rest(reader, &mut byte, 0, "payload").await?;
    if byte[0] == QUIT_BYTE {
        Ok(Request::Quit)
    } else {
        Ok(Request::Image(ImageHeader {
            len,
            lead_byte: Some(byte[0]),
        }))
    }
}

/// Write a response and flush it.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&response.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// Send an image request. A payload of exactly `b"q"` is the termination signal.
pub async fn write_image<W>(writer: &mut W, payload: &[u8]) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&(payload.len() as u64).to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Send the termination signal.
pub async fn write_quit<W>(writer: &mut W) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    write_image(writer, &[QUIT_BYTE]).await
}

/// Read one response from the server, accepting at most `max_text_len` bytes
/// of decoded text.
pub async fn read_response<R>(reader: &mut R, max_text_len: u64) -> Result<Response, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut code = [0u8; OUTCOME_LEN];
    read_head(reader, &mut code, "outcome code").await?;

    let response = match OutcomeCode::try_from(i32::from_le_bytes(code))? {
        OutcomeCode::Success => {
            let mut prefix = [0u8; LENGTH_PREFIX_LEN];
            read_rest(reader, &mut prefix, 0, "text length").await?;
            let len = u64::from_le_bytes(prefix);
            if len > max_text_len {
                return Err(CodecError::TextTooLong {
                    len,
                    limit: max_text_len,
                });
            }
            let mut text = vec![0u8; len as usize];
            read_rest(reader, &mut text, 0, "text").await?;
            Response::Success(String::from_utf8(text)?)
        }
        OutcomeCode::Failure => Response::Failure,
        OutcomeCode::Timeout => Response::Timeout,
        OutcomeCode::RateLimitExceeded => Response::RateLimitExceeded,
        OutcomeCode::ServerBusy => Response::ServerBusy,
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn quit_signal_is_recognized() {
        let mut input: &[u8] = &[1, 0, 0, 0, 0, 0, 0, 0, b'q'];
        assert_eq!(read_request(&mut input).await.unwrap(), Request::Quit);
    }

    #[tokio::test]
    async fn single_byte_image_keeps_lead_byte() {
        let mut input: &[u8] = &[1, 0, 0, 0, 0, 0, 0, 0, b'x'];
        let request = read_request(&mut input).await.unwrap();
        let Request::Image(header) = request else {
            panic!("expected image, got {:?}", request);
        };
        assert_eq!(header.len, 1);
        assert_eq!(header.lead_byte, Some(b'x'));
        assert_eq!(header.remaining(), 0);
    }

    #[tokio::test]
    async fn image_payload_is_left_unread() {
        let mut input: &[u8] = &[4, 0, 0, 0, 0, 0, 0, 0, b'a', b'b', b'c', b'd'];
        let request = read_request(&mut input).await.unwrap();
        assert_eq!(
            request,
            Request::Image(ImageHeader { len: 4, lead_byte: None })
        );
        assert_eq!(input, b"abcd");
    }

    #[tokio::test]
    async fn prefix_split_across_reads_is_reassembled() {
        let (mut client, mut server) = duplex(64);
        let writer = tokio::spawn(async move {
            let prefix = 300u64.to_le_bytes();
            client.write_all(&prefix[..3]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            client.write_all(&prefix[3..]).await.unwrap();
            client
        });

        let request = read_request(&mut server).await.unwrap();
        assert_eq!(
            request,
            Request::Image(ImageHeader { len: 300, lead_byte: None })
        );
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn empty_stream_is_clean_close() {
        let mut input: &[u8] = &[];
        assert!(matches!(read_request(&mut input).await, Err(CodecError::Closed)));
    }

    #[tokio::test]
    async fn eof_inside_prefix_is_truncation() {
        let mut input: &[u8] = &[4, 0, 0];
        match read_request(&mut input).await {
            Err(CodecError::Truncated { expected, received, .. }) => {
                assert_eq!(expected, 8);
                assert_eq!(received, 3);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn failure_encodes_code_only() {
        assert_eq!(Response::Failure.encode(), vec![1, 0, 0, 0]);
        assert_eq!(Response::ServerBusy.encode(), vec![4, 0, 0, 0]);
    }

    #[test]
    fn success_encodes_text_with_length() {
        let encoded = Response::Success("http://a".into()).encode();
        assert_eq!(&encoded[..4], &[0, 0, 0, 0]);
        assert_eq!(&encoded[4..12], &8u64.to_le_bytes());
        assert_eq!(&encoded[12..], b"http://a");
    }

    #[tokio::test]
    async fn client_reads_success_written_by_server() {
        let (mut client, mut server) = duplex(256);
        write_response(&mut server, &Response::Success("https://example.com".into()))
            .await
            .unwrap();
        write_response(&mut server, &Response::Timeout).await.unwrap();

        assert_eq!(
            read_response(&mut client, 1024).await.unwrap(),
            Response::Success("https://example.com".into())
        );
        assert_eq!(read_response(&mut client, 1024).await.unwrap(), Response::Timeout);
    }

    #[tokio::test]
    async fn oversized_text_is_refused() {
        let mut input: &[u8] = &[0, 0, 0, 0, 200, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            read_response(&mut input, 100).await,
            Err(CodecError::TextTooLong { len: 200, limit: 100 })
        ));
    }

    #[tokio::test]
    async fn client_quit_is_server_quit() {
        let (mut client, mut server) = duplex(64);
        write_quit(&mut client).await.unwrap();
        assert_eq!(read_request(&mut server).await.unwrap(), Request::Quit);
    }
}
