//! RIFF/WAVE layout helpers for the bundled PCM codec.
//!
//! Writers emit the canonical 44-byte header with placeholder sizes and patch
//! them when the file is sealed. Readers locate the `fmt ` and `data` chunks
//! and tolerate unpatched sizes from writers that never finished.

use std::io::{Read, Seek, SeekFrom, Write};
use std::time::Duration;

use crate::models::audio_models::{frames_to_duration, AudioFormat};
use crate::models::error::CaptureError;

/// Size of the canonical WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

const PCM_FORMAT_CODE: u16 = 1;
const RIFF_SIZE_OFFSET: u64 = 4;
const DATA_SIZE_OFFSET: u64 = 40;

/// PCM format of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WavSpec {
    pub fn pcm16(format: &AudioFormat) -> Self {
        Self {
            sample_rate: format.sample_rate,
            channels: format.channels,
            bits_per_sample: 16,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    pub fn frames_in(&self, data_bytes: u64) -> u64 {
        data_bytes / self.block_align() as u64
    }

    pub fn duration_of(&self, data_bytes: u64) -> Duration {
        frames_to_duration(self.frames_in(data_bytes), self.sample_rate)
    }

    /// Byte offset into the data chunk of the frame nearest to `at`.
    pub fn byte_offset(&self, at: Duration) -> u64 {
        let frame = (at.as_secs_f64() * self.sample_rate as f64).round() as u64;
        frame * self.block_align() as u64
    }

    /// The 44-byte header for `data_size` bytes of samples.
    ///
    /// Layout:
    /// ```text
    /// [0-3]    "RIFF"
    /// [4-7]    36 + data_size
    /// [8-11]   "WAVE"
    /// [12-15]  "fmt "
    /// [16-19]  16
    /// [20-21]  1 (PCM)
    /// [22-23]  channels
    /// [24-27]  sample_rate
    /// [28-31]  byte_rate
    /// [32-33]  block_align
    /// [34-35]  bits_per_sample
    /// [36-39]  "data"
    /// [40-43]  data_size
    /// ```
    pub fn header(&self, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
        let mut header = [0u8; WAV_HEADER_SIZE];

        header[0..4].copy_from_slice(b"RIFF");
        header[4..8].copy_from_slice(&(36u32.saturating_add(data_size)).to_le_bytes());
        header[8..12].copy_from_slice(b"WAVE");

        header[12..16].copy_from_slice(b"fmt ");
        header[16..20].copy_from_slice(&16u32.to_le_bytes());
        header[20..22].copy_from_slice(&PCM_FORMAT_CODE.to_le_bytes());
        header[22..24].copy_from_slice(&self.channels.to_le_bytes());
        header[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        header[28..32].copy_from_slice(&self.byte_rate().to_le_bytes());
        header[32..34].copy_from_slice(&self.block_align().to_le_bytes());
        header[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());

        header[36..40].copy_from_slice(b"data");
        header[40..44].copy_from_slice(&data_size.to_le_bytes());

        header
    }
}

/// Patch the RIFF and data size fields of a file written with [`WavSpec::header`].
pub fn patch_sizes<W: Write + Seek>(file: &mut W, data_size: u64) -> std::io::Result<()> {
    let data_size = u32::try_from(data_size).unwrap_or(u32::MAX);

    file.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
    file.write_all(&36u32.saturating_add(data_size).to_le_bytes())?;

    file.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
    file.write_all(&data_size.to_le_bytes())?;

    file.seek(SeekFrom::End(0))?;
    Ok(())
}

/// Where the samples of a WAV file live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavLayout {
    pub spec: WavSpec,
    pub data_offset: u64,
    pub data_len: u64,
}

impl WavLayout {
    pub fn duration(&self) -> Duration {
        self.spec.duration_of(self.data_len)
    }
}

/// Locate the format and sample data of a PCM WAV stream.
pub fn read_layout<R: Read + Seek>(reader: &mut R) -> Result<WavLayout, CaptureError> {
    let file_len = reader
        .seek(SeekFrom::End(0))
        .map_err(|e| CaptureError::storage("failed to size wav", e))?;
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| CaptureError::storage("failed to rewind wav", e))?;

    let mut riff = [0u8; 12];
    reader
        .read_exact(&mut riff)
        .map_err(|e| CaptureError::storage("truncated wav header", e))?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(CaptureError::StorageError("not a RIFF/WAVE file".into()));
    }

    let mut spec = None;
    let mut position = 12u64;

    while position + 8 <= file_len {
        let mut chunk = [0u8; 8];
        reader
            .read_exact(&mut chunk)
            .map_err(|e| CaptureError::storage("truncated wav chunk", e))?;
        position += 8;

        let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as u64;

        match &chunk[0..4] {
            b"fmt " => {
                let mut fmt = [0u8; 16];
                reader
                    .read_exact(&mut fmt)
                    .map_err(|e| CaptureError::storage("truncated fmt chunk", e))?;

                let format_code = u16::from_le_bytes([fmt[0], fmt[1]]);
                if format_code != PCM_FORMAT_CODE {
                    return Err(CaptureError::StorageError(format!(
                        "unsupported wav format code: {}",
                        format_code
                    )));
                }
                let parsed = WavSpec {
                    channels: u16::from_le_bytes([fmt[2], fmt[3]]),
                    sample_rate: u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]),
                    bits_per_sample: u16::from_le_bytes([fmt[14], fmt[15]]),
                };
                if parsed.channels == 0 || parsed.sample_rate == 0 || parsed.block_align() == 0 {
                    return Err(CaptureError::StorageError("degenerate wav format".into()));
                }
                spec = Some(parsed);

                position += 16;
                let rest = size.saturating_sub(16) + (size & 1);
                position = seek_to(reader, position + rest)?;
            }
            b"data" => {
                let spec = spec.ok_or_else(|| {
                    CaptureError::StorageError("wav data chunk precedes fmt chunk".into())
                })?;
                let available = file_len - position;
                // An unsealed writer leaves 0 (or garbage) in the size field.
                let data_len = if size == 0 || size > available {
                    available
                } else {
                    size
                };
                let data_len = data_len - data_len % spec.block_align() as u64;
                return Ok(WavLayout {
                    spec,
                    data_offset: position,
                    data_len,
                });
            }
            _ => {
                position = seek_to(reader, position + size + (size & 1))?;
            }
        }
    }

    Err(CaptureError::StorageError("wav file has no data chunk".into()))
}

fn seek_to<R: Seek>(reader: &mut R, position: u64) -> Result<u64, CaptureError> {
    reader
        .seek(SeekFrom::Start(position))
        .map_err(|e| CaptureError::storage("failed to seek wav", e))
}
