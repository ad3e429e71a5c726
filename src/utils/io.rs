use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::HEADER_SIZE;

/// Read exactly one frame: the fixed header, then the payload length it declares
pub async fn read_frame_bytes<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; HEADER_SIZE];
    reader.read_exact(&mut buf).await?;

    let payload_len = u16::from_le_bytes([buf[3], buf[4]]) as usize;
    if payload_len > 0 {
        buf.resize(HEADER_SIZE + payload_len, 0);
        reader.read_exact(&mut buf[HEADER_SIZE..]).await?;
    }
    Ok(buf)
}

/// Write all bytes and flush
pub async fn write_all<W: AsyncWrite + Unpin>(writer: &mut W, buf: &[u8]) -> std::io::Result<()> {
    writer.write_all(buf).await?;
    writer.flush().await?;
    Ok(())
}
