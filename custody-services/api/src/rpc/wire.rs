// std
use std::io;
// crates
use bincode::config::{
    Bounded, FixintEncoding, LittleEndian, RejectTrailing, WithOtherEndian, WithOtherIntEncoding,
    WithOtherLimit, WithOtherTrailing,
};
use bincode::Options;
use once_cell::sync::Lazy;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
// internal
use crate::messages::{ENVELOPE_LEN, MAX_CONTENT_LEN};

type LenType = u32;
const LEN_PREFIX_BYTES: usize = size_of::<LenType>();
/// Frames larger than this are refused on both ends. A request at the content
/// limit still fits.
pub const MAX_FRAME_LEN: usize = MAX_CONTENT_LEN + ENVELOPE_LEN;

type BincodeOptions = WithOtherTrailing<
    WithOtherIntEncoding<
        WithOtherLimit<WithOtherEndian<bincode::DefaultOptions, LittleEndian>, Bounded>,
        FixintEncoding,
    >,
    RejectTrailing,
>;

static OPTIONS: Lazy<BincodeOptions> = Lazy::new(|| {
    bincode::DefaultOptions::new()
        .with_little_endian()
        .with_limit(MAX_FRAME_LEN as u64)
        .with_fixint_encoding()
        .reject_trailing_bytes()
});

#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("Failed to serialize message: {0}")]
    Serialize(bincode::Error),
    #[error("Failed to deserialize message: {0}")]
    Deserialize(bincode::Error),
    #[error("Message too large. Maximum size is {max}. Actual size is {0}", max = MAX_FRAME_LEN)]
    TooLarge(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Serializes `message` into a length-prefixed frame.
pub fn pack<Message>(message: &Message) -> Result<Vec<u8>, WireError>
where
    Message: Serialize,
{
    let payload = OPTIONS.serialize(message).map_err(WireError::Serialize)?;
    let length = payload.len();
    if length > MAX_FRAME_LEN {
        return Err(WireError::TooLarge(length));
    }
    let prefix = LenType::try_from(length).map_err(|_| WireError::TooLarge(length))?;
    let mut buffer = Vec::with_capacity(LEN_PREFIX_BYTES + length);
    buffer.extend_from_slice(&prefix.to_be_bytes());
    buffer.extend_from_slice(&payload);
    Ok(buffer)
}

pub fn unpack<Message>(payload: &[u8]) -> Result<Message, WireError>
where
    Message: DeserializeOwned,
{
    OPTIONS.deserialize(payload).map_err(WireError::Deserialize)
}

pub async fn write_message<Message, W>(writer: &mut W, message: &Message) -> Result<(), WireError>
where
    Message: Serialize,
    W: AsyncWrite + Unpin,
{
    writer.write_all(&pack(message)?).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the payload of the next frame. `None` means the peer closed the
/// stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, WireError>
where
    R: AsyncRead + Unpin,
{
    let length = match reader.read_u32().await {
        Ok(length) => length as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if length > MAX_FRAME_LEN {
        return Err(WireError::TooLarge(length));
    }
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}
