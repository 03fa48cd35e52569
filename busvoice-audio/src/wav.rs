//! In-place gain for 16-bit PCM WAV files

use std::fs;
use std::io;
use std::path::Path;

/// Multiply every sample of the `data` chunk by `gain`. Files that are not
/// RIFF/WAVE are left untouched.
pub fn scale_wav_pcm16_inplace(path: &Path, gain: f32) -> io::Result<()> {
    let mut buf = fs::read(path)?;
    if !scale_pcm16(&mut buf, gain) {
        return Ok(());
    }
    fs::write(path, &buf)
}

/// Returns false when `buf` has no data chunk to scale.
pub(crate) fn scale_pcm16(buf: &mut [u8], gain: f32) -> bool {
    if buf.len() < 12 || &buf[0..4] != b"RIFF" || &buf[8..12] != b"WAVE" {
        return false;
    }
    let mut idx = 12;
    let mut data = None;
    while idx + 8 <= buf.len() {
        let size = u32::from_le_bytes([buf[idx + 4], buf[idx + 5], buf[idx + 6], buf[idx + 7]])
            as usize;
        if &buf[idx..idx + 4] == b"data" {
            let start = idx + 8;
            // Streaming writers leave the size unset; clamp to what is there
            data = Some(start..start.saturating_add(size).min(buf.len()));
            break;
        }
        idx += 8 + size + (size & 1);
    }
    let Some(range) = data else {
        return false;
    };
    for chunk in buf[range].chunks_exact_mut(2) {
        let s = i16::from_le_bytes([chunk[0], chunk[1]]);
        let scaled = (s as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        chunk.copy_from_slice(&scaled.to_le_bytes());
    }
    true
}
