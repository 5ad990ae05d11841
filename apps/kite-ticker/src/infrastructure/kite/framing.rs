//! Binary Message Framing
//!
//! Splits one inbound binary message into tick packets.
//!
//! ```text
//! +-----------+-----------+-----------+-----+-----------+-----------+
//! | count u16 | len_1 u16 | packet_1  | ... | len_n u16 | packet_n  |
//! +-----------+-----------+-----------+-----+-----------+-----------+
//! ```
//!
//! All integers are big-endian. Messages shorter than two bytes are
//! server heartbeats and carry no packets.

/// Framing errors. Any of these invalidates the whole message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The length prefix of a packet is cut off.
    #[error("packet {index} of {count}: missing length prefix")]
    MissingLength {
        /// Zero-based packet index.
        index: usize,
        /// Declared packet count.
        count: usize,
    },

    /// A packet declares more bytes than the message holds.
    #[error("packet {index} of {count}: declared {declared} bytes, {remaining} remain")]
    Truncated {
        /// Zero-based packet index.
        index: usize,
        /// Declared packet count.
        count: usize,
        /// Declared packet length.
        declared: usize,
        /// Bytes left in the message.
        remaining: usize,
    },
}

/// Packets of one binary message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packets<'a> {
    /// Packet payloads in wire order.
    pub packets: Vec<&'a [u8]>,
    /// Bytes left over after the last declared packet.
    pub trailing: usize,
}

/// Whether a binary message is a server heartbeat.
#[must_use]
pub const fn is_heartbeat(message: &[u8]) -> bool {
    message.len() < 2
}

/// Split a binary message into packet slices.
///
/// Heartbeats yield no packets. Trailing bytes after the last declared
/// packet are reported in [`Packets::trailing`] and otherwise ignored.
///
/// # Errors
///
/// Returns `FrameError` if a length prefix is missing or a packet runs past
/// the end of the message.
pub fn split_packets(message: &[u8]) -> Result<Packets<'_>, FrameError> {
    if is_heartbeat(message) {
        return Ok(Packets::default());
    }

    let count = usize::from(u16::from_be_bytes([message[0], message[1]]));
    let mut packets = Vec::with_capacity(count);
    let mut rest = &message[2..];

    for index in 0..count {
        let Some((prefix, body)) = rest.split_first_chunk::<2>() else {
            return Err(FrameError::MissingLength { index, count });
        };
        let declared = usize::from(u16::from_be_bytes(*prefix));
        if declared > body.len() {
            return Err(FrameError::Truncated {
                index,
                count,
                declared,
                remaining: body.len(),
            });
        }

        let (packet, tail) = body.split_at(declared);
        packets.push(packet);
        rest = tail;
    }

    Ok(Packets {
        packets,
        trailing: rest.len(),
    })
}
