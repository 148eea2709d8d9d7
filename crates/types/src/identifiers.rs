// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Identifiers for tables, segments, partitions and row keys.

use std::fmt;

use bytes::Bytes;

/// Name of a user table. Tables are independent namespaces for primary keys,
/// key-value state and segments.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
    derive_more::AsRef,
)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TableName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for TableName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Partition within the input or output log.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
#[serde(transparent)]
pub struct PartitionId(u32);

impl PartitionId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("segment name '{name}' does not follow the <table>__<partition>__<sequence>__<creation-time> convention")]
pub struct InvalidSegmentName {
    pub name: String,
}

/// Name of a sealed columnar segment.
///
/// Segments produced by low-level consumers encode their upstream partition in
/// the name: `<table>__<partition>__<sequence>__<creation-time>`. That mapping
/// is what keeps all updates targeting one segment on a single output-log
/// partition.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
    derive_more::AsRef,
)]
#[serde(transparent)]
pub struct SegmentName(String);

impl SegmentName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The upstream partition this segment was consumed from, parsed out of
    /// the segment name.
    pub fn partition_id(&self) -> Result<PartitionId, InvalidSegmentName> {
        let mut parts = self.0.split("__");
        let _table = parts.next();
        let partition = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| InvalidSegmentName {
                name: self.0.clone(),
            })?;
        Ok(PartitionId::new(partition))
    }
}

impl From<&str> for SegmentName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SegmentName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Primary key of a logical row. Opaque bytes; equality and hashing are
/// defined over the full byte sequence.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimaryKey(Bytes);

impl PrimaryKey {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<&[u8]> for PrimaryKey {
    fn from(value: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u8>> for PrimaryKey {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrimaryKey({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_name_partition_parsing() {
        let segment = SegmentName::from("orders__3__17__20240115T0800Z");
        assert_eq!(segment.partition_id(), Ok(PartitionId::new(3)));
    }

    #[test]
    fn segment_name_rejects_unparseable_partition() {
        assert!(SegmentName::from("orders-3-17").partition_id().is_err());
        assert!(SegmentName::from("orders__x__17__t").partition_id().is_err());
        assert!(SegmentName::from("orders").partition_id().is_err());
    }

    #[test]
    fn primary_key_formats_as_hex() {
        let key = PrimaryKey::from(vec![0xab, 0x01]);
        assert_eq!(key.to_string(), "ab01");
    }
}
