//! RTMP simple handshake
//!
//! ```text
//! Client                                   Server
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes: time+random) ->|
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536 bytes: time+random) --|
//!   |<------ S2 (1536 bytes: echo C1) ------|
//!   |------- C2 (1536 bytes: echo S1) ----->|
//! ```
//!
//! No HMAC digest; servers accept the simple form from publishers. The echo
//! in S2 is not verified since several servers get it wrong.

use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

type Packet = [u8; HANDSHAKE_SIZE];

fn epoch_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// C1/S1: 4-byte time, 4 zero bytes, pseudo-random fill
fn generate_packet() -> Packet {
    let mut packet = [0u8; HANDSHAKE_SIZE];
    let time = epoch_millis();
    packet[0..4].copy_from_slice(&time.to_be_bytes());

    // LCG fill; the handshake has no secrecy requirement
    let mut seed = (time as u64) ^ 0x9E37_79B9_7F4A_7C15;
    for chunk in packet[8..].chunks_mut(8) {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let bytes = seed.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
    packet
}

/// C2/S2: the peer's packet with our receive time in bytes 4..8
fn echo(peer: &Packet) -> Packet {
    let mut out = *peer;
    out[4..8].copy_from_slice(&epoch_millis().to_be_bytes());
    out
}

fn check_version(version: u8) -> Result<()> {
    // encoders send anything from 3 up; below 3 is the old encrypted scheme
    if version < RTMP_VERSION {
        return Err(HandshakeError::InvalidVersion(version).into());
    }
    Ok(())
}

/// Run the client side over a blocking stream
pub fn client_handshake<S: Read + Write>(stream: &mut S) -> Result<()> {
    let c1 = generate_packet();
    let mut c0c1 = Vec::with_capacity(1 + HANDSHAKE_SIZE);
    c0c1.push(RTMP_VERSION);
    c0c1.extend_from_slice(&c1);
    stream.write_all(&c0c1)?;
    stream.flush()?;

    let mut s0 = [0u8; 1];
    stream.read_exact(&mut s0)?;
    check_version(s0[0])?;

    let mut s1 = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut s1)?;
    let mut s2 = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut s2)?;

    stream.write_all(&echo(&s1))?;
    stream.flush()?;
    tracing::trace!("Handshake complete");
    Ok(())
}

/// Run the server side over a blocking stream
pub fn server_handshake<S: Read + Write>(stream: &mut S) -> Result<()> {
    let mut c0 = [0u8; 1];
    stream.read_exact(&mut c0)?;
    check_version(c0[0])?;
    let mut c1 = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut c1)?;

    let mut response = Vec::with_capacity(1 + 2 * HANDSHAKE_SIZE);
    response.push(RTMP_VERSION);
    response.extend_from_slice(&generate_packet());
    response.extend_from_slice(&echo(&c1));
    stream.write_all(&response)?;
    stream.flush()?;

    let mut c2 = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut c2)?;
    Ok(())
}
