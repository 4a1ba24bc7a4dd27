//! Hand-assembled Standard MIDI Files for tests.

/// Encodes a variable-length quantity.
pub fn vlq(mut value: u32) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        bytes.insert(0, (value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    bytes
}

/// Builds a format-1 file from raw track bodies.
pub fn smf(division: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = b"MThd".to_vec();
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&division.to_be_bytes());
    for body in tracks {
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(body);
    }
    bytes
}

/// Track body from (absolute tick, status, data1, data2) channel events,
/// closed with end-of-track.
pub fn track(events: &[(u32, u8, u8, u8)]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut last = 0;
    for &(tick, status, d1, d2) in events {
        body.extend(vlq(tick - last));
        body.extend_from_slice(&[status, d1, d2]);
        last = tick;
    }
    body.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
    body
}

/// Track body holding only SetTempo events at (absolute tick, tempo).
pub fn tempo_track(changes: &[(u32, u32)]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut last = 0;
    for &(tick, tempo) in changes {
        body.extend(vlq(tick - last));
        body.extend_from_slice(&[0xFF, 0x51, 0x03]);
        body.extend_from_slice(&tempo.to_be_bytes()[1..]);
        last = tick;
    }
    body.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
    body
}
