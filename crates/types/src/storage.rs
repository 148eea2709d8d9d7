// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fixed-layout binary encoding for everything that lands on disk: key-value
//! store values and update-log records. Big-endian throughout.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::message::{MessageContext, UpdateKind, UpdateLogEntry};
use crate::SegmentName;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of input, needed {needed} more bytes")]
    UnexpectedEof { needed: usize },
    #[error("unknown update kind tag {0}")]
    UnknownKind(u8),
    #[error("segment name is not valid utf-8")]
    InvalidSegmentName,
}

fn ensure_remaining<B: Buf>(buf: &B, needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::UnexpectedEof {
            needed: needed - buf.remaining(),
        });
    }
    Ok(())
}

impl MessageContext {
    /// Layout: u16 segment-name length, name bytes, u64 source offset,
    /// u64 timestamp.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let name = self.segment.as_str().as_bytes();
        debug_assert!(name.len() <= u16::MAX as usize);
        buf.put_u16(name.len() as u16);
        buf.put_slice(name);
        buf.put_u64(self.source_offset);
        buf.put_u64(self.timestamp);
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        ensure_remaining(buf, 2)?;
        let name_len = buf.get_u16() as usize;
        ensure_remaining(buf, name_len + 16)?;
        let name = buf.copy_to_bytes(name_len);
        let segment = std::str::from_utf8(&name)
            .map_err(|_| CodecError::InvalidSegmentName)?
            .to_owned();
        Ok(Self {
            segment: SegmentName::new(segment),
            source_offset: buf.get_u64(),
            timestamp: buf.get_u64(),
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.segment.as_str().len() + 16);
        self.encode(&mut buf);
        buf.freeze()
    }

    pub fn from_slice(mut slice: &[u8]) -> Result<Self, CodecError> {
        Self::decode(&mut slice)
    }
}

impl UpdateLogEntry {
    /// Update-log records are fixed width so a torn tail is detectable by
    /// length alone.
    pub const ENCODED_LEN: usize = 17;

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64(self.source_offset);
        buf.put_u64(self.value);
        buf.put_u8(self.kind.as_u8());
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        ensure_remaining(buf, Self::ENCODED_LEN)?;
        let source_offset = buf.get_u64();
        let value = buf.get_u64();
        let tag = buf.get_u8();
        let kind = UpdateKind::from_u8(tag).ok_or(CodecError::UnknownKind(tag))?;
        Ok(Self {
            source_offset,
            value,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_codec() {
        let context = MessageContext::new("orders__0__4__t", 1042, 1_700_000_000_000);
        let bytes = context.to_bytes();
        assert_eq!(MessageContext::from_slice(&bytes), Ok(context));
    }

    #[test]
    fn context_decode_rejects_truncation() {
        let context = MessageContext::new("orders__0__4__t", 1042, 77);
        let bytes = context.to_bytes();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(
            MessageContext::from_slice(truncated),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn update_log_entry_is_fixed_width() {
        let entry = UpdateLogEntry::new(100, 150, UpdateKind::Delete);
        let mut buf = BytesMut::new();
        entry.encode(&mut buf);
        assert_eq!(buf.len(), UpdateLogEntry::ENCODED_LEN);
        let mut slice = &buf[..];
        assert_eq!(UpdateLogEntry::decode(&mut slice), Ok(entry));
    }

    #[test]
    fn update_log_entry_rejects_unknown_kind() {
        let mut buf = BytesMut::new();
        UpdateLogEntry::new(1, 2, UpdateKind::Insert).encode(&mut buf);
        buf[UpdateLogEntry::ENCODED_LEN - 1] = 9;
        let mut slice = &buf[..];
        assert_eq!(
            UpdateLogEntry::decode(&mut slice),
            Err(CodecError::UnknownKind(9))
        );
    }
}
