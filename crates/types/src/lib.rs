// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Core types shared by the strata coordinator and segment components.

mod identifiers;

pub mod config;
pub mod message;
pub mod retries;
pub mod storage;

pub use identifiers::*;
pub use message::{MessageContext, SegmentUpdate, UpdateKind, UpdateLogEntry, UpsertEvent};
