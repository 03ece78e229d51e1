// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::time::Duration;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Fallback MSS Parameter for TCP
pub const FALLBACK_MSS: usize = 536;

/// Minimum MSS Parameter for TCP
pub const MIN_MSS: usize = 88;

/// Maximum MSS Parameter for TCP
pub const MAX_MSS: usize = u16::MAX as usize;

/// Default MSS Parameter for TCP
pub const DEFAULT_MSS: usize = FALLBACK_MSS;

/// Default receive window, four full segments.
pub const DEFAULT_WINDOW_SIZE: u32 = 4 * DEFAULT_MSS as u32;

/// Period of the externally driven protocol tick.
pub const TCP_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Maximum segment lifetime.
/// See: https://www.rfc-editor.org/rfc/rfc793#section-3.3
pub const TCP_MSL: Duration = Duration::from_secs(60);

/// Initial retransmission timeout before any round-trip sample.
pub const TCP_INITIAL_RTO: Duration = Duration::from_secs(3);

/// How long FIN_WAIT_2 lingers once the application closed its receive side.
pub const TCP_FIN_WAIT_TIMEOUT: Duration = Duration::from_secs(20);

/// How long a half-open passive connection waits for the final handshake ACK.
pub const TCP_SYN_RCVD_TIMEOUT: Duration = Duration::from_secs(20);

/// Default time-to-live handed to the IP layer.
pub const DEFAULT_TTL: u8 = 255;

/// Retransmission timeout shift applied after each successive retransmission.
pub const TCP_BACKOFF: [u8; 13] = [1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7];

/// Persist timer intervals, in ticks, for successive zero-window probes.
pub const TCP_PERSIST_BACKOFF: [u8; 7] = [3, 6, 12, 24, 48, 96, 120];
