//! Wire protocol: record serialization, status responses and the
//! transport seam.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Beacon record serializer and cache mediator.
pub mod beacon;
/// Percent-encoding and truncation rules.
pub mod encoding;
/// Numeric record kinds.
pub mod event_type;
/// Transport seam (client trait + URL building).
pub mod http;
/// Server status response parsing.
pub mod status;

/// Version of the beacon protocol spoken by this crate.
pub const PROTOCOL_VERSION: i32 = 3;
/// Platform tag transmitted with every request.
pub const PLATFORM_TYPE: i32 = 1;
/// Agent technology type transmitted with every request.
pub const AGENT_TECHNOLOGY_TYPE: &str = "okrs";
/// Agent version reported in the beacon prefix.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
