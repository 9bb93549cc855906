//! The 4-byte length prefix wrapping every wire frame on the wire, shared by
//! the server and client connection tasks.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::wire::{self, Message};

pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Message>, wire::DecodeError> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > wire::MAX_FRAME_LEN {
        return Err(wire::DecodeError::FieldTooLarge);
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body).await?;
    wire::decode(&body)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, message: &Message) -> std::io::Result<()> {
    let body = wire::encode(message)?;
    w.write_all(&(body.len() as u32).to_be_bytes()).await?;
    w.write_all(&body).await?;
    Ok(())
}
