//! Message framing.
//!
//! Every message travels as an 11-byte header (2-byte magic, 1-byte type,
//! 8-byte big-endian length) followed by the typed body. Readers reject a
//! bad magic, an unknown type and an oversized length before touching the
//! body; decoders must consume the body exactly.

use crate::message::Message;
use crate::{NetworkError, NetworkResult};
use bytes::{BufMut, Bytes, BytesMut};
use mw_consensus::{MsgType, HEADER_LEN, MAX_MSG_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Header of a framed protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Message type.
    pub msg_type: MsgType,
    /// Body length in bytes.
    pub len: u64,
}

impl MsgHeader {
    /// Read and validate a header from `stream`.
    pub async fn read<R>(stream: &mut R, magic: [u8; 2]) -> NetworkResult<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; HEADER_LEN as usize];
        stream.read_exact(&mut buf).await?;

        if buf[..2] != magic {
            return Err(NetworkError::BadMagic([buf[0], buf[1]]));
        }

        let msg_type = MsgType::try_from(buf[2]).map_err(NetworkError::UnknownMessageType)?;
        let len = u64::from_be_bytes(buf[3..11].try_into().expect("fixed slice length"));

        Ok(Self { msg_type, len })
    }
}

/// Serialize `msg` and write it as a single framed message.
///
/// The header and body go out through one buffered write with a single
/// flush. Returns the total number of bytes written.
pub async fn write_message<W>(stream: &mut W, msg: &Message, magic: [u8; 2]) -> NetworkResult<u64>
where
    W: AsyncWrite + Unpin,
{
    let body = msg.body_bytes();

    let mut buf = BytesMut::with_capacity(HEADER_LEN as usize + body.len());
    buf.put_slice(&magic);
    buf.put_u8(msg.msg_type() as u8);
    buf.put_u64(body.len() as u64);
    buf.put_slice(&body);

    stream.write_all(&buf).await?;
    stream.flush().await?;

    Ok(HEADER_LEN + body.len() as u64)
}

/// Read one framed message of any known type.
///
/// Returns the decoded message and the total bytes consumed (header
/// included). The body read is bounded by the validated length and the
/// decoder must consume it exactly.
pub async fn read_any_message<R>(stream: &mut R, magic: [u8; 2]) -> NetworkResult<(Message, u64)>
where
    R: AsyncRead + Unpin,
{
    let header = MsgHeader::read(stream, magic).await?;

    if header.len > MAX_MSG_LEN {
        return Err(NetworkError::MessageTooLarge {
            size: header.len,
            max: MAX_MSG_LEN,
        });
    }

    let mut body = vec![0u8; header.len as usize];
    stream.read_exact(&mut body).await?;

    let msg = Message::read_body(header.msg_type, Bytes::from(body))?;
    Ok((msg, HEADER_LEN + header.len))
}

/// Read one framed message, rejecting any type other than `expected`.
pub async fn read_message<R>(
    stream: &mut R,
    expected: MsgType,
    magic: [u8; 2],
) -> NetworkResult<(Message, u64)>
where
    R: AsyncRead + Unpin,
{
    let header = MsgHeader::read(stream, magic).await?;

    if header.msg_type != expected {
        return Err(NetworkError::UnexpectedMessageType {
            got: header.msg_type as u8,
        });
    }
    if header.len > MAX_MSG_LEN {
        return Err(NetworkError::MessageTooLarge {
            size: header.len,
            max: MAX_MSG_LEN,
        });
    }

    let mut body = vec![0u8; header.len as usize];
    stream.read_exact(&mut body).await?;

    let msg = Message::read_body(header.msg_type, Bytes::from(body))?;
    Ok((msg, HEADER_LEN + header.len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mw_consensus::{Capabilities, Difficulty, MAGIC_CODE};

    #[tokio::test]
    async fn shake_parsing() {
        // Framed Shake: version 1, fast-sync capabilities, total
        // difficulty 30000, user agent "MW/Grin 0.3.0".
        let raw = hex_bytes(
            "54340200000000000000250000000100000006000000000000753000000000\
             0000000d4d572f4772696e20302e332e30",
        );

        let mut stream = raw.as_slice();
        let (msg, read) = read_message(&mut stream, MsgType::Shake, MAGIC_CODE)
            .await
            .unwrap();

        assert_eq!(read, raw.len() as u64);
        let shake = match msg {
            Message::Shake(s) => s,
            other => panic!("wrong message type: {:?}", other.msg_type()),
        };
        assert_eq!(shake.version, 1);
        assert_eq!(shake.capabilities, Capabilities::FAST_SYNC_NODE);
        assert_eq!(shake.total_difficulty, Difficulty::from_num(30000));
        assert_eq!(shake.user_agent, "MW/Grin 0.3.0");
    }

    #[tokio::test]
    async fn rejects_bad_magic() {
        let raw = hex_bytes("1ec503000000000000001000000000000000010000000000000001");
        let mut stream = raw.as_slice();
        assert!(matches!(
            read_any_message(&mut stream, MAGIC_CODE).await,
            Err(NetworkError::BadMagic([0x1e, 0xc5]))
        ));
    }

    #[tokio::test]
    async fn rejects_unknown_type() {
        let mut raw = vec![0x54, 0x34, 0xee];
        raw.extend_from_slice(&0u64.to_be_bytes());
        let mut stream = raw.as_slice();
        assert!(matches!(
            read_any_message(&mut stream, MAGIC_CODE).await,
            Err(NetworkError::UnknownMessageType(0xee))
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_length() {
        let mut raw = vec![0x54, 0x34, MsgType::Ping as u8];
        raw.extend_from_slice(&(MAX_MSG_LEN + 1).to_be_bytes());
        let mut stream = raw.as_slice();
        assert!(matches!(
            read_any_message(&mut stream, MAGIC_CODE).await,
            Err(NetworkError::MessageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_unexpected_type() {
        let msg = Message::Ping(crate::message::Ping {
            total_difficulty: Difficulty::from_num(1),
            height: 1,
        });
        let mut raw = Vec::new();
        write_message(&mut raw, &msg, MAGIC_CODE).await.unwrap();

        let mut stream = raw.as_slice();
        assert!(matches!(
            read_message(&mut stream, MsgType::Pong, MAGIC_CODE).await,
            Err(NetworkError::UnexpectedMessageType { got }) if got == MsgType::Ping as u8
        ));
    }

    #[tokio::test]
    async fn rejects_trailing_body_bytes() {
        let msg = Message::Ping(crate::message::Ping {
            total_difficulty: Difficulty::from_num(1),
            height: 1,
        });
        let mut raw = Vec::new();
        write_message(&mut raw, &msg, MAGIC_CODE).await.unwrap();

        // Grow the declared length and append a stray byte.
        let body_len = (raw.len() - HEADER_LEN as usize + 1) as u64;
        raw[3..11].copy_from_slice(&body_len.to_be_bytes());
        raw.push(0xaa);

        let mut stream = raw.as_slice();
        assert!(matches!(
            read_any_message(&mut stream, MAGIC_CODE).await,
            Err(NetworkError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn write_reports_total_bytes() {
        let msg = Message::Ping(crate::message::Ping {
            total_difficulty: Difficulty::from_num(7),
            height: 9,
        });
        let mut raw = Vec::new();
        let written = write_message(&mut raw, &msg, MAGIC_CODE).await.unwrap();
        assert_eq!(written, raw.len() as u64);
        assert_eq!(written, HEADER_LEN + 16);
    }

    fn hex_bytes(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }
}
