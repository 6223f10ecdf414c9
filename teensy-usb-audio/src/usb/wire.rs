//! USB audio wire format conversion.
//!
//! Isochronous audio payloads carry little-endian 16-bit PCM, interleaved per
//! sample index:
//!
//! - receive (host → device): stereo frames `[L lo, L hi, R lo, R hi]`
//! - transmit (device → host): `CH` channels per frame, channel 0 first

/// Bytes per 16-bit sample on the wire.
pub const SAMPLE_BYTES: usize = 2;

/// Bytes per stereo frame on the receive endpoint.
pub const RX_FRAME_BYTES: usize = 2 * SAMPLE_BYTES;

#[inline(always)]
fn sample_at(bytes: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([bytes[at], bytes[at + 1]])
}

/// Split stereo frames from `src` into `left` and `right`.
///
/// `left.len()` frames are consumed. The copy follows the alignment of the
/// destination: one frame at a time until `left` sits on a 32-bit boundary,
/// then two frames per step so each channel receives one aligned word, then
/// any trailing frame. Pool blocks are word-aligned and both channels share an
/// offset, so the two channels are always in phase.
///
/// # Panics
///
/// Debug-asserts that `right` matches `left` and that `src` holds enough
/// frames.
pub fn deinterleave_stereo(src: &[u8], left: &mut [i16], right: &mut [i16]) {
    debug_assert_eq!(left.len(), right.len());
    debug_assert!(src.len() >= left.len() * RX_FRAME_BYTES);

    let frames = left.len();
    let misaligned = (left.as_ptr() as usize) & 0b10 != 0;
    let lead = usize::from(misaligned && frames > 0);
    let pairs = (frames - lead) / 2;

    let (src_lead, rest) = src.split_at(lead * RX_FRAME_BYTES);
    let (src_pairs, src_tail) = rest.split_at(pairs * 2 * RX_FRAME_BYTES);
    let (left_lead, left_rest) = left.split_at_mut(lead);
    let (right_lead, right_rest) = right.split_at_mut(lead);
    let (left_pairs, left_tail) = left_rest.split_at_mut(pairs * 2);
    let (right_pairs, right_tail) = right_rest.split_at_mut(pairs * 2);

    split_frames(src_lead, left_lead, right_lead);

    for ((l, r), f) in left_pairs
        .chunks_exact_mut(2)
        .zip(right_pairs.chunks_exact_mut(2))
        .zip(src_pairs.chunks_exact(2 * RX_FRAME_BYTES))
    {
        l.copy_from_slice(&[sample_at(f, 0), sample_at(f, 4)]);
        r.copy_from_slice(&[sample_at(f, 2), sample_at(f, 6)]);
    }

    split_frames(src_tail, left_tail, right_tail);
}

fn split_frames(src: &[u8], left: &mut [i16], right: &mut [i16]) {
    for ((l, r), f) in left
        .iter_mut()
        .zip(right.iter_mut())
        .zip(src.chunks_exact(RX_FRAME_BYTES))
    {
        *l = sample_at(f, 0);
        *r = sample_at(f, 2);
    }
}

/// Interleave `channels`, starting at sample `offset`, into `dest`.
///
/// Fills as many whole frames as `dest` holds (`dest.len() / (channels.len()
/// * 2)`), writing every channel's sample for one index before moving on.
///
/// # Panics
///
/// Panics if a channel has fewer than `offset + frames` samples.
pub fn interleave_channels<B: AsRef<[i16]>>(dest: &mut [u8], channels: &[B], offset: usize) {
    let frame_bytes = channels.len() * SAMPLE_BYTES;
    if frame_bytes == 0 {
        return;
    }
    for (index, frame) in dest.chunks_exact_mut(frame_bytes).enumerate() {
        for (out, channel) in frame.chunks_exact_mut(SAMPLE_BYTES).zip(channels) {
            out.copy_from_slice(&channel.as_ref()[offset + index].to_le_bytes());
        }
    }
}

/// Fill a wire buffer region with digital silence.
pub fn silence(dest: &mut [u8]) {
    dest.fill(0);
}
