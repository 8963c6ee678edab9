//! Splits a duplex byte stream into MySQL protocol packets: `len:u24 |
//! seq:u8 | payload[len]`, reassembling payloads that span more than one
//! 16 MiB frame and re-splitting outgoing payloads the same way.

use byteorder::{LittleEndian, WriteBytesExt};
use common::err::MysqlError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_PAYLOAD_LEN;

/// Per-command packet sequence counter and frame (de)multiplexer over an
/// async duplex stream.
///
/// Only one command is ever in flight on a connection, so the framer
/// owns the stream outright rather than sharing it behind a lock.
pub struct PacketFramer<S> {
    stream: S,
    seq: u8,
}

impl<S> PacketFramer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        PacketFramer { stream, seq: 0 }
    }

    /// Re-zeros the sequence counter. Called after a successful
    /// authentication and at the end of every command-phase iteration.
    pub fn reset_seq(&mut self) {
        self.seq = 0;
    }

    /// Reads one logical packet, reassembling split frames as needed.
    pub async fn read_packet(&mut self) -> Result<Vec<u8>, MysqlError> {
        let mut payload = Vec::new();
        loop {
            let mut header = [0u8; 4];
            self.stream.read_exact(&mut header).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    MysqlError::ConnectionClosed
                } else {
                    MysqlError::Io(e)
                }
            })?;

            let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
            let seq = header[3];
            if seq != self.seq {
                return Err(MysqlError::Protocol(format!(
                    "sequence id mismatch: expected {}, got {}",
                    self.seq, seq
                )));
            }
            self.seq = self.seq.wrapping_add(1);

            let mut frame = vec![0u8; len];
            self.stream.read_exact(&mut frame).await?;
            let is_continued = len == MAX_PAYLOAD_LEN;
            payload.extend_from_slice(&frame);

            if !is_continued {
                break;
            }
        }
        Ok(payload)
    }

    /// Writes one logical packet, splitting it into `0xFFFFFF`-byte frames
    /// as needed. A payload whose length is an exact multiple of
    /// `0xFFFFFF` (including zero) gets a trailing empty frame so the
    /// reader's continuation rule terminates.
    pub async fn write_packet(&mut self, payload: &[u8]) -> Result<(), MysqlError> {
        let mut offset = 0;
        loop {
            let remaining = payload.len() - offset;
            let chunk_len = remaining.min(MAX_PAYLOAD_LEN);
            self.write_frame(&payload[offset..offset + chunk_len])
                .await?;
            offset += chunk_len;

            if chunk_len < MAX_PAYLOAD_LEN {
                break;
            }
        }
        Ok(())
    }

    async fn write_frame(&mut self, chunk: &[u8]) -> Result<(), MysqlError> {
        let mut header = Vec::with_capacity(4);
        header.write_u24::<LittleEndian>(chunk.len() as u32)?;
        WriteBytesExt::write_u8(&mut header, self.seq)?;
        self.seq = self.seq.wrapping_add(1);

        self.stream.write_all(&header).await?;
        self.stream.write_all(chunk).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}
