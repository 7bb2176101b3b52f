//! One-shot job handoff from the supervisor to a spawned child
//!
//! The parent writes exactly two frames to the child's stdin, each a
//! versioned JSON envelope on its own line: the [`Header`] first, then the
//! [`Bytecode`]. The child reads stdin to the end and decodes both in that
//! order.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sprocket_core::{Bytecode, Header};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::IpcError;
use crate::protocol::{HandoffFrame, MessageEnvelope, IPC_PROTOCOL_VERSION};

fn write_frame(buffer: &mut Vec<u8>, frame: HandoffFrame) -> Result<(), IpcError> {
    serde_json::to_writer(&mut *buffer, &MessageEnvelope::new(frame))
        .map_err(|e| IpcError::SerializationError(e.to_string()))?;
    buffer.push(b'\n');
    Ok(())
}

fn read_frame<'a>(lines: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<HandoffFrame, IpcError> {
    let line = lines
        .next()
        .ok_or_else(|| IpcError::InvalidMessage(format!("missing {} frame", what)))?;

    let envelope: MessageEnvelope<HandoffFrame> = serde_json::from_str(line)
        .map_err(|e| IpcError::DeserializationError(format!("{} frame: {}", what, e)))?;

    if !envelope.is_compatible() {
        return Err(IpcError::ProtocolVersionMismatch {
            expected: IPC_PROTOCOL_VERSION,
            actual: envelope.protocol_version,
        });
    }

    Ok(envelope.message)
}

/// Encode a job into the buffer written to the child's stdin
pub fn encode_handoff(header: &Header, bytecode: &Bytecode) -> Result<Vec<u8>, IpcError> {
    let mut buffer = Vec::with_capacity(bytecode.payload.len() * 4 / 3 + 512);

    write_frame(&mut buffer, HandoffFrame::Header(header.clone()))?;
    write_frame(
        &mut buffer,
        HandoffFrame::Bytecode {
            engine: bytecode.engine.clone(),
            payload: STANDARD.encode(&bytecode.payload),
        },
    )?;

    Ok(buffer)
}

/// Decode a handoff buffer, Header first then Bytecode
pub fn decode_handoff(input: &[u8]) -> Result<(Header, Bytecode), IpcError> {
    let text = std::str::from_utf8(input)
        .map_err(|e| IpcError::DeserializationError(format!("handoff is not UTF-8: {}", e)))?;
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let header = match read_frame(&mut lines, "header")? {
        HandoffFrame::Header(header) => header,
        HandoffFrame::Bytecode { .. } => {
            return Err(IpcError::InvalidMessage("expected header frame, got bytecode".to_string()))
        }
    };

    let bytecode = match read_frame(&mut lines, "bytecode")? {
        HandoffFrame::Bytecode { engine, payload } => {
            let payload = STANDARD
                .decode(payload.as_bytes())
                .map_err(|e| IpcError::DeserializationError(format!("bytecode payload: {}", e)))?;
            Bytecode::new(engine, payload)
        }
        HandoffFrame::Header(_) => {
            return Err(IpcError::InvalidMessage("expected bytecode frame, got header".to_string()))
        }
    };

    if lines.next().is_some() {
        return Err(IpcError::InvalidMessage("trailing data after bytecode frame".to_string()));
    }

    debug!(
        "Decoded handoff for task {} ({} bytes of {})",
        header.task_id,
        bytecode.payload.len(),
        bytecode.engine
    );
    Ok((header, bytecode))
}

/// Read a reader (the child's stdin) to the end and decode it
pub async fn read_handoff<R>(mut reader: R) -> Result<(Header, Bytecode), IpcError>
where
    R: AsyncRead + Unpin,
{
    let mut input = Vec::new();
    reader.read_to_end(&mut input).await?;

    if input.is_empty() {
        return Err(IpcError::InvalidMessage("empty handoff".to_string()));
    }

    decode_handoff(&input)
}
