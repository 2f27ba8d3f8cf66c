//! # WAV Repackaging Fallback
//!
//! When the recognizer rejects a WAV upload on the first attempt, the
//! pipeline re-reads the frames and wraps them in a fresh canonical header.
//! This recovers uploads whose header is unusual (extra chunks, extensible
//! format tag, odd RIFF sizes) but whose frames are fine.
//!
//! ## Fidelity Gap:
//! Frame bytes are copied verbatim. The source header is used only to find
//! frame boundaries; the new header claims the canonical rate, width and
//! channel count whatever the source really was. A 44.1 kHz stereo upload
//! comes out labelled as 16 kHz mono and will play back at the wrong speed.
//! No resampling is done here.

use crate::audio::format::PcmSpec;
use crate::transcription::result::PipelineError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;
const CANONICAL_HEADER_LEN: u32 = 44;

/// `fmt ` chunk fields needed to locate whole frames.
#[derive(Debug, Clone, Copy)]
struct SourceFormat {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

impl SourceFormat {
    fn frame_len(&self) -> usize {
        self.channels as usize * ((self.bits_per_sample as usize + 7) / 8)
    }
}

fn malformed(message: impl Into<String>) -> PipelineError {
    PipelineError::RepackagingFailed(message.into())
}

/// Re-wrap the frames of `wav` in a canonical header declaring `spec`.
///
/// ## Returns:
/// - **Ok(Vec<u8>)**: a 44-byte header followed by the source frames, unchanged
/// - **Err(RepackagingFailed)**: the input is not a readable PCM WAV container
pub fn repackage(wav: &[u8], spec: &PcmSpec) -> Result<Vec<u8>, PipelineError> {
    let (source, frames) = read_frames(wav)?;

    tracing::debug!(
        source_rate = source.sample_rate,
        source_channels = source.channels,
        source_bits = source.bits_per_sample,
        frame_bytes = frames.len(),
        "Repackaging WAV frames with canonical header"
    );

    if source.sample_rate != spec.sample_rate_hz
        || source.channels != spec.channels
        || source.bits_per_sample != spec.bits_per_sample()
    {
        tracing::warn!(
            source_rate = source.sample_rate,
            source_channels = source.channels,
            target_rate = spec.sample_rate_hz,
            target_channels = spec.channels,
            "Repackaged header does not match the source format; frames are not resampled"
        );
    }

    write_canonical(frames, spec)
}

/// Walk the RIFF chunks and return the source format plus the data frames,
/// truncated to whole frames.
fn read_frames(wav: &[u8]) -> Result<(SourceFormat, &[u8]), PipelineError> {
    let mut cursor = Cursor::new(wav);
    let mut tag = [0u8; 4];

    cursor
        .read_exact(&mut tag)
        .map_err(|_| malformed("input is shorter than a RIFF header"))?;
    if &tag != b"RIFF" {
        return Err(malformed("missing RIFF signature"));
    }
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| malformed("truncated RIFF header"))?;
    cursor
        .read_exact(&mut tag)
        .map_err(|_| malformed("truncated RIFF header"))?;
    if &tag != b"WAVE" {
        return Err(malformed("RIFF form type is not WAVE"));
    }

    let mut format: Option<SourceFormat> = None;

    loop {
        if cursor.read_exact(&mut tag).is_err() {
            break;
        }
        let size = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| malformed("truncated chunk header"))?;
        let start = cursor.position();

        match &tag {
            b"fmt " => format = Some(read_format(&mut cursor, size)?),
            b"data" => {
                let source = format.ok_or_else(|| malformed("data chunk precedes fmt chunk"))?;
                let frame_len = source.frame_len();
                if frame_len == 0 {
                    return Err(malformed("fmt chunk declares zero-sized frames"));
                }
                let start = start as usize;
                let available = wav.len().saturating_sub(start).min(size as usize);
                let whole = available - available % frame_len;
                return Ok((source, &wav[start..start + whole]));
            }
            _ => {}
        }

        // Chunks are word aligned; odd sizes carry one pad byte.
        let next = start + size as u64 + (size as u64 & 1);
        cursor.set_position(next);
    }

    Err(malformed("no data chunk found"))
}

fn read_format(cursor: &mut Cursor<&[u8]>, size: u32) -> Result<SourceFormat, PipelineError> {
    if size < 16 {
        return Err(malformed(format!("fmt chunk too short: {} bytes", size)));
    }
    let truncated = |_| malformed("truncated fmt chunk");

    let format_tag = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let channels = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let sample_rate = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let _byte_rate = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let _block_align = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let bits_per_sample = cursor.read_u16::<LittleEndian>().map_err(truncated)?;

    if format_tag != WAVE_FORMAT_PCM && format_tag != WAVE_FORMAT_EXTENSIBLE {
        return Err(malformed(format!("unsupported WAV format tag {:#06x}", format_tag)));
    }

    Ok(SourceFormat {
        channels,
        sample_rate,
        bits_per_sample,
    })
}

/// RIFF chunk size field for a canonical file carrying `data_len` bytes of frames.
fn riff_size(data_len: u32) -> Result<u32, PipelineError> {
    data_len
        .checked_add(CANONICAL_HEADER_LEN - 8)
        .ok_or_else(|| malformed("data chunk too large for a RIFF container"))
}

fn write_canonical(frames: &[u8], spec: &PcmSpec) -> Result<Vec<u8>, PipelineError> {
    let data_len = u32::try_from(frames.len()).map_err(|_| malformed("data chunk exceeds 4 GiB"))?;
    let riff_len = riff_size(data_len)?;
    let mut out = Vec::with_capacity(CANONICAL_HEADER_LEN as usize + frames.len());

    write_header(&mut out, riff_len, data_len, spec)
        .map_err(|e| malformed(format!("header write failed: {}", e)))?;
    out.extend_from_slice(frames);
    Ok(out)
}

fn write_header(out: &mut Vec<u8>, riff_len: u32, data_len: u32, spec: &PcmSpec) -> std::io::Result<()> {
    out.write_all(b"RIFF")?;
    out.write_u32::<LittleEndian>(riff_len)?;
    out.write_all(b"WAVE")?;

    out.write_all(b"fmt ")?;
    out.write_u32::<LittleEndian>(16)?;
    out.write_u16::<LittleEndian>(WAVE_FORMAT_PCM)?;
    out.write_u16::<LittleEndian>(spec.channels)?;
    out.write_u32::<LittleEndian>(spec.sample_rate_hz)?;
    out.write_u32::<LittleEndian>(spec.byte_rate())?;
    out.write_u16::<LittleEndian>(spec.block_align())?;
    out.write_u16::<LittleEndian>(spec.bits_per_sample())?;

    out.write_all(b"data")?;
    out.write_u32::<LittleEndian>(data_len)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::fixtures::{wav_bytes, wav_spec};

    /// Data-chunk bytes of a WAV produced by `wav_bytes` (canonical 44-byte header).
    fn frames_of(wav: &[u8]) -> &[u8] {
        &wav[44..]
    }

    fn raw_wav(format_tag: u16, channels: u16, rate: u32, bits: u16, chunks: Vec<(&[u8; 4], Vec<u8>)>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&format_tag.to_le_bytes());
        body.extend_from_slice(&channels.to_le_bytes());
        body.extend_from_slice(&rate.to_le_bytes());
        let block_align = channels * ((bits + 7) / 8);
        body.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        body.extend_from_slice(&block_align.to_le_bytes());
        body.extend_from_slice(&bits.to_le_bytes());
        for (id, payload) in chunks {
            body.extend_from_slice(id);
            body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            body.extend_from_slice(&payload);
            if payload.len() % 2 == 1 {
                body.push(0);
            }
        }
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(body.len() as u32).to_le_bytes());
        wav.extend_from_slice(&body);
        wav
    }

    #[test]
    fn test_frames_preserved_and_header_forced_to_spec() {
        let samples: Vec<i16> = (0..4410).map(|i| (i * 7) as i16).collect();
        let source = wav_bytes(44100, 2, &samples);
        let spec = PcmSpec::default();

        let repackaged = repackage(&source, &spec).unwrap();

        assert_eq!(repackaged.len(), source.len());
        assert_eq!(frames_of(&repackaged), frames_of(&source));

        let header = wav_spec(&repackaged);
        assert_eq!(header.sample_rate, 16000);
        assert_eq!(header.channels, 1);
        assert_eq!(header.bits_per_sample, 16);
    }

    #[test]
    fn test_skips_unknown_chunks_including_padded_ones() {
        let frames: Vec<u8> = (0u8..64).collect();
        let source = raw_wav(
            WAVE_FORMAT_PCM,
            1,
            22050,
            16,
            vec![(b"LIST", b"odd".to_vec()), (b"data", frames.clone())],
        );

        let repackaged = repackage(&source, &PcmSpec::default()).unwrap();

        assert_eq!(&repackaged[44..], frames.as_slice());
        assert_eq!(&repackaged[40..44], &(frames.len() as u32).to_le_bytes());
    }

    #[test]
    fn test_truncated_data_chunk_keeps_whole_frames() {
        let frames: Vec<u8> = (0u8..10).collect();
        let mut source = raw_wav(WAVE_FORMAT_PCM, 2, 16000, 16, vec![(b"data", frames.clone())]);
        // Claim more data than is present; 10 bytes of 4-byte frames leaves 8.
        let data_size_offset = source.len() - frames.len() - 4;
        source[data_size_offset..data_size_offset + 4].copy_from_slice(&1000u32.to_le_bytes());

        let repackaged = repackage(&source, &PcmSpec::default()).unwrap();

        assert_eq!(&repackaged[44..], &frames[..8]);
    }

    #[test]
    fn test_eight_bit_frames_copied_verbatim() {
        let frames: Vec<u8> = vec![128, 130, 126, 140, 120];
        let source = raw_wav(WAVE_FORMAT_PCM, 1, 8000, 8, vec![(b"data", frames.clone())]);

        let repackaged = repackage(&source, &PcmSpec::default()).unwrap();

        assert_eq!(&repackaged[44..], frames.as_slice());
        assert_eq!(&repackaged[34..36], &16u16.to_le_bytes());
    }

    #[test]
    fn test_rejects_non_riff_input() {
        let err = repackage(b"OggS\x00\x02 definitely not a wav", &PcmSpec::default()).unwrap_err();
        assert!(matches!(err, PipelineError::RepackagingFailed(_)));
    }

    #[test]
    fn test_rejects_compressed_format_tag() {
        let source = raw_wav(0x0055, 1, 16000, 16, vec![(b"data", vec![0, 0, 0, 0])]);
        let err = repackage(&source, &PcmSpec::default()).unwrap_err();
        assert!(err.to_string().contains("format tag"));
    }

    #[test]
    fn test_riff_size_rejects_overflowing_data_length() {
        assert_eq!(riff_size(100).unwrap(), 136);
        assert_eq!(riff_size(u32::MAX - 36).unwrap(), u32::MAX);

        let err = riff_size(u32::MAX - 35).unwrap_err();
        assert!(matches!(err, PipelineError::RepackagingFailed(_)));
    }

    #[test]
    fn test_rejects_missing_data_chunk() {
        let source = raw_wav(WAVE_FORMAT_PCM, 1, 16000, 16, Vec::new());
        let err = repackage(&source, &PcmSpec::default()).unwrap_err();
        assert!(err.to_string().contains("no data chunk"));
    }
}
