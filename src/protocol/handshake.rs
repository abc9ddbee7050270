//! Distribution handshake, initiating side.
//!
//! ```text
//! us                                   peer
//! send_name   'N' flags creation name  ->
//!             <-  's' "ok"             status
//!             <-  'N' flags challenge creation name
//! reply       'r' challenge digest     ->
//!             <-  'a' digest           ack
//! ```
//!
//! All multi-byte integers are big-endian. Only the modern (OTP 23+) variant
//! is spoken; a peer without `HANDSHAKE_23` is refused rather than downgraded.
//!
//! Each step is a pure encode or decode function so it can be checked in
//! isolation; [`perform`] strings them together over a [`Transport`].

use crate::core::digest::{digest, generate_challenge, verify_digest, DIGEST_LEN};
use crate::core::flags::DistFlags;
use crate::error::{DistError, Result};
use crate::service::node::NodeIdentity;
use crate::transport::Transport;
use crate::utils::metrics::{global_metrics, Timer};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, instrument, warn};

pub const SEND_NAME_TAG: u8 = b'N';
pub const STATUS_TAG: u8 = b's';
pub const CHALLENGE_TAG: u8 = b'N';
pub const CHALLENGE_REPLY_TAG: u8 = b'r';
pub const CHALLENGE_ACK_TAG: u8 = b'a';

/// Status that lets the handshake continue
pub const STATUS_OK: &str = "ok";

/// Fixed part of the challenge frame after the tag: flags, challenge,
/// creation, name length.
const CHALLENGE_HEADER_LEN: usize = 8 + 4 + 4 + 2;

/// Where a connection stands in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    Opening,
    SendName,
    AwaitStatus,
    AwaitChallenge,
    SendChallengeReply,
    AwaitChallengeAck,
    Established,
}

/// What the peer told us about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub name: String,
    /// Normalized: `MANDATORY_25_DIGEST` is always set
    pub flags: DistFlags,
    pub creation: u32,
}

/// Decoded challenge frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub flags: DistFlags,
    pub challenge: u32,
    pub creation: u32,
    /// Raw bytes as sent; not necessarily UTF-8
    pub name: Vec<u8>,
}

impl Challenge {
    /// Peer name for display, with invalid UTF-8 replaced.
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// `'N' ‖ flags ‖ creation ‖ nameLen ‖ name`
pub fn encode_send_name(flags: DistFlags, creation: u32, name: &str) -> Result<Bytes> {
    let name_len = u16::try_from(name.len())
        .map_err(|_| DistError::EncodeError(format!("Node name too long: {} bytes", name.len())))?;
    let mut buf = BytesMut::with_capacity(1 + 8 + 4 + 2 + name.len());
    buf.put_u8(SEND_NAME_TAG);
    buf.put_slice(&flags.to_be_bytes());
    buf.put_u32(creation);
    buf.put_u16(name_len);
    buf.put_slice(name.as_bytes());
    Ok(buf.freeze())
}

/// Accept only `'s' "ok"`.
pub fn check_status(frame: &[u8]) -> Result<()> {
    match frame.split_first() {
        Some((&STATUS_TAG, status)) => {
            if status == STATUS_OK.as_bytes() {
                Ok(())
            } else {
                Err(DistError::StatusRejected(
                    String::from_utf8_lossy(status).into_owned(),
                ))
            }
        }
        _ => Err(DistError::ProtocolError),
    }
}

/// Parse the peer's challenge frame and normalize its flags.
///
/// Does not check capabilities or identity; see [`check_challenge`].
pub fn decode_challenge(frame: &[u8]) -> Result<Challenge> {
    let body = match frame.split_first() {
        Some((&CHALLENGE_TAG, body)) => body,
        Some(_) => return Err(DistError::UnexpectedPeerType),
        None => return Err(DistError::ProtocolError),
    };
    if body.len() < CHALLENGE_HEADER_LEN {
        return Err(DistError::ProtocolError);
    }

    let (flag_bytes, rest) = body.split_at(8);
    let (challenge, rest) = rest.split_at(4);
    let (creation, rest) = rest.split_at(4);
    let (name_len, rest) = rest.split_at(2);

    let name_len = usize::from(u16::from_be_bytes([name_len[0], name_len[1]]));
    let name = rest.get(..name_len).ok_or(DistError::ProtocolError)?;

    let mut raw = [0u8; 8];
    raw.copy_from_slice(flag_bytes);
    let mut flags = DistFlags::from_be_bytes(raw);
    // older peers use this digest scheme without announcing it
    flags.insert(DistFlags::MANDATORY_25_DIGEST);

    Ok(Challenge {
        flags,
        challenge: u32::from_be_bytes([challenge[0], challenge[1], challenge[2], challenge[3]]),
        creation: u32::from_be_bytes([creation[0], creation[1], creation[2], creation[3]]),
        name: name.to_vec(),
    })
}

/// Require `HANDSHAKE_23` and a name byte-for-byte equal to the expected one.
pub fn check_challenge(challenge: &Challenge, expected_peer_name: &str) -> Result<()> {
    if !challenge.flags.contains(DistFlags::HANDSHAKE_23) {
        return Err(DistError::ChallengeMissing(DistFlags::HANDSHAKE_23));
    }
    if challenge.name != expected_peer_name.as_bytes() {
        return Err(DistError::WrongPeerName(challenge.name_lossy()));
    }
    Ok(())
}

/// `'r' ‖ ownChallenge ‖ digest`
pub fn encode_challenge_reply(own_challenge: u32, digest: &[u8; DIGEST_LEN]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + 4 + DIGEST_LEN);
    buf.put_u8(CHALLENGE_REPLY_TAG);
    buf.put_u32(own_challenge);
    buf.put_slice(digest);
    buf.freeze()
}

/// Check `'a' ‖ digest` against our own challenge.
///
/// Bytes past the digest are ignored.
pub fn verify_challenge_ack(frame: &[u8], cookie: &str, own_challenge: u32) -> Result<()> {
    let received = match frame.split_first() {
        Some((&CHALLENGE_ACK_TAG, rest)) => rest.get(..DIGEST_LEN).ok_or(DistError::ProtocolError)?,
        _ => return Err(DistError::ProtocolError),
    };
    if verify_digest(cookie, own_challenge, received) {
        Ok(())
    } else {
        Err(DistError::PeerAuthenticationError)
    }
}

/// Drive the handshake to completion over an open transport.
///
/// Sends nothing after the challenge reply. On failure the transport must
/// be discarded.
#[instrument(skip(transport, local), fields(peer = %transport.peer(), node = %local.name))]
pub async fn perform(
    transport: &Transport,
    local: &NodeIdentity,
    expected_peer_name: &str,
) -> Result<PeerInfo> {
    let metrics = global_metrics();
    metrics.handshake_attempt();
    let _timer = Timer::start("handshake");

    match run(transport, local, expected_peer_name).await {
        Ok(peer) => {
            metrics.handshake_success();
            debug!(state = ?HandshakeState::Established, peer_flags = ?peer.flags, "Handshake complete");
            Ok(peer)
        }
        Err(e) => {
            metrics.handshake_failed();
            warn!(error = %e, "Handshake failed");
            Err(e)
        }
    }
}

async fn run(transport: &Transport, local: &NodeIdentity, expected_peer_name: &str) -> Result<PeerInfo> {
    debug!(state = ?HandshakeState::SendName, flags = %local.flags, "Sending name");
    transport.send_frame(encode_send_name(local.flags, local.creation, &local.name)?)?;

    debug!(state = ?HandshakeState::AwaitStatus);
    check_status(&transport.recv_frame().await?)?;

    debug!(state = ?HandshakeState::AwaitChallenge);
    let challenge = decode_challenge(&transport.recv_frame().await?)?;
    check_challenge(&challenge, expected_peer_name)?;

    debug!(state = ?HandshakeState::SendChallengeReply);
    let own_challenge = generate_challenge();
    let reply = digest(local.cookie.expose(), challenge.challenge);
    transport.send_frame(encode_challenge_reply(own_challenge, &reply))?;

    debug!(state = ?HandshakeState::AwaitChallengeAck);
    let ack = transport.recv_frame().await?;
    verify_challenge_ack(&ack, local.cookie.expose(), own_challenge)?;

    Ok(PeerInfo {
        // equal to the received bytes after check_challenge
        name: expected_peer_name.to_owned(),
        flags: challenge.flags,
        creation: challenge.creation,
    })
}
