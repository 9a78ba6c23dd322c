//! Probe wire format — the frames beacon exchanges with a game server to
//! measure liveness and round-trip time.
//!
//! These frames ARE the game's session protocol as far as the prober is
//! concerned. Every byte offset here is fixed by the game's network stack;
//! changing anything breaks interop with live servers.
//!
//! All frame types are #[repr(C, packed)] for deterministic layout and use
//! zerocopy derives for allocation-free serialization. There is no unsafe
//! code in this module.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Magic bytes identifying the game protocol, first 4 bytes of every frame.
pub const PROTOCOL_ID: [u8; 4] = [0x4f, 0x45, 0x74, 0x03];

/// Peer id used before the remote has assigned us one.
pub const PEER_ID_NONE: [u8; 2] = [0x00, 0x00];

/// Packet type: control frame (carries a control subtype byte).
pub const PACKET_TYPE_CONTROL: u8 = 0x00;

/// Packet type: bare payload, prompts the remote to assign a peer id.
pub const PACKET_TYPE_ORIGINAL: u8 = 0x01;

/// Packet type: reliable wrapper (what the remote answers with).
pub const PACKET_TYPE_RELIABLE: u8 = 0x03;

/// Control subtype: the remote is assigning us a peer id.
pub const CONTROLTYPE_SET_PEER_ID: u8 = 0x01;

/// Control subtype: clean session teardown.
pub const CONTROLTYPE_DISCO: u8 = 0x03;

/// Byte offset of the assigned peer id inside the remote's reply.
///
/// Reply layout: protocol id (4), sender peer id (2), channel (1),
/// RELIABLE (1), seqnum (2), CONTROL (1), SET_PEER_ID (1), peer id (2).
pub const REPLY_PEER_ID_OFFSET: usize = 12;

/// Minimum reply length that still contains the assigned peer id.
pub const MIN_REPLY_LEN: usize = REPLY_PEER_ID_OFFSET + 2;

// ── Hello ─────────────────────────────────────────────────────────────────────

/// The opening frame of the liveness handshake.
///
/// Sent with no peer id; the remote responds by assigning one, and that
/// round trip is what the prober times.
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct HelloFrame {
    pub protocol_id: [u8; 4],
    pub sender_peer_id: [u8; 2],
    pub channel: u8,
    pub packet_type: u8,
}

assert_eq_size!(HelloFrame, [u8; 8]);

impl HelloFrame {
    pub fn new() -> Self {
        Self {
            protocol_id: PROTOCOL_ID,
            sender_peer_id: PEER_ID_NONE,
            channel: 0,
            packet_type: PACKET_TYPE_ORIGINAL,
        }
    }
}

impl Default for HelloFrame {
    fn default() -> Self {
        Self::new()
    }
}

// ── Disconnect ────────────────────────────────────────────────────────────────

/// Clean teardown of the probe session.
///
/// Echoes the peer id the remote assigned so the remote can drop the
/// half-open session instead of waiting for it to time out.
///
/// Wire size: 9 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct DisconnectFrame {
    pub protocol_id: [u8; 4],
    pub sender_peer_id: [u8; 2],
    pub channel: u8,
    pub packet_type: u8,
    pub control_type: u8,
}

assert_eq_size!(DisconnectFrame, [u8; 9]);

impl DisconnectFrame {
    pub fn new(assigned_peer_id: [u8; 2]) -> Self {
        Self {
            protocol_id: PROTOCOL_ID,
            sender_peer_id: assigned_peer_id,
            channel: 0,
            packet_type: PACKET_TYPE_CONTROL,
            control_type: CONTROLTYPE_DISCO,
        }
    }
}

// ── Reply parsing ─────────────────────────────────────────────────────────────

/// Extract the peer id the remote assigned us from its reply.
pub fn parse_assigned_peer_id(reply: &[u8]) -> Result<[u8; 2], WireError> {
    if reply.len() < MIN_REPLY_LEN {
        return Err(WireError::ReplyTooShort(reply.len()));
    }
    if reply[..4] != PROTOCOL_ID {
        return Err(WireError::BadProtocolId([
            reply[0], reply[1], reply[2], reply[3],
        ]));
    }
    Ok([reply[REPLY_PEER_ID_OFFSET], reply[REPLY_PEER_ID_OFFSET + 1]])
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("reply too short: {0} bytes, need {MIN_REPLY_LEN}")]
    ReplyTooShort(usize),

    #[error("reply does not start with the protocol id: {0:02x?}")]
    BadProtocolId([u8; 4]),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
