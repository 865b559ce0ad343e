//! Bundled 16-bit PCM WAV implementations of the encoder and muxer traits.
//!
//! PCM needs no priming and cuts on any frame boundary, so concatenation and
//! trimming are plain byte copies of the data chunks.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::models::audio_models::{AudioFormat, EncodedFile, MediaInfo, TimeRange};
use crate::models::error::CaptureError;
use crate::processing::wav_format::{self, WavLayout, WavSpec, WAV_HEADER_SIZE};
use crate::traits::encoder::{SegmentEncoder, SegmentWriter};
use crate::traits::muxer::{CancelToken, Muxer};

const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Encoder producing 16-bit PCM WAV segments.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavEncoder;

impl SegmentEncoder for WavEncoder {
    fn open(
        &self,
        path: &Path,
        format: &AudioFormat,
    ) -> Result<Box<dyn SegmentWriter>, CaptureError> {
        Ok(Box::new(WavSegmentWriter::create(path, WavSpec::pcm16(format))?))
    }

    fn file_extension(&self) -> &str {
        "wav"
    }

    fn mime_type(&self) -> &str {
        "audio/wav"
    }
}

/// Streaming WAV writer. Sizes in the header are patched on `finish()`.
pub struct WavSegmentWriter {
    path: PathBuf,
    spec: WavSpec,
    file: Option<BufWriter<File>>,
    data_bytes: u64,
}

impl WavSegmentWriter {
    pub fn create(path: &Path, spec: WavSpec) -> Result<Self, CaptureError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::storage("failed to create directory", e))?;
        }

        let file = File::create(path).map_err(|e| CaptureError::storage("failed to create file", e))?;
        let mut file = BufWriter::new(file);
        file.write_all(&spec.header(0))
            .map_err(|e| CaptureError::storage("failed to write wav header", e))?;

        Ok(Self {
            path: path.to_path_buf(),
            spec,
            file: Some(file),
            data_bytes: 0,
        })
    }
}

impl SegmentWriter for WavSegmentWriter {
    fn write(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("file is not open for writing".into()))?;

        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        file.write_all(&bytes)
            .map_err(|e| CaptureError::storage("write failed", e))?;
        self.data_bytes += bytes.len() as u64;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.spec.frames_in(self.data_bytes)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn finish(mut self: Box<Self>) -> Result<EncodedFile, CaptureError> {
        let file = self
            .file
            .take()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        let mut file = file
            .into_inner()
            .map_err(|e| CaptureError::storage("failed to flush wav", e.into_error()))?;

        wav_format::patch_sizes(&mut file, self.data_bytes)
            .map_err(|e| CaptureError::storage("failed to patch wav header", e))?;
        file.flush().map_err(|e| CaptureError::storage("failed to flush wav", e))?;

        Ok(EncodedFile {
            path: self.path.clone(),
            duration: self.spec.duration_of(self.data_bytes),
            size_bytes: WAV_HEADER_SIZE as u64 + self.data_bytes,
            frames: self.frames_written(),
        })
    }

    fn abandon(mut self: Box<Self>) {
        drop(self.file.take());
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to delete abandoned {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Muxer for files written by [`WavEncoder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WavMuxer;

impl Muxer for WavMuxer {
    fn concatenate(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<MediaInfo, CaptureError> {
        cancel.check()?;

        let mut sources = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut file = open(input)?;
            let layout = wav_format::read_layout(&mut file)?;
            sources.push((file, layout));
        }

        let spec = match sources.first() {
            Some((_, layout)) => layout.spec,
            None => return Err(CaptureError::StorageError("nothing to concatenate".into())),
        };
        if let Some((_, mismatch)) = sources.iter().find(|(_, layout)| layout.spec != spec) {
            return Err(CaptureError::StorageError(format!(
                "cannot concatenate {:?} onto {:?}",
                mismatch.spec, spec
            )));
        }

        export(output, spec, |out| {
            let mut total = 0;
            for (file, layout) in sources.iter_mut() {
                total += copy_range(file, out, layout.data_offset, layout.data_len, cancel)?;
            }
            Ok(total)
        })
    }

    fn trim(
        &self,
        input: &Path,
        output: &Path,
        range: TimeRange,
        cancel: &CancelToken,
    ) -> Result<MediaInfo, CaptureError> {
        cancel.check()?;

        let mut file = open(input)?;
        let WavLayout {
            spec,
            data_offset,
            data_len,
        } = wav_format::read_layout(&mut file)?;

        let start = spec.byte_offset(range.start).min(data_len);
        let end = spec.byte_offset(range.end).min(data_len);
        if end <= start {
            return Err(CaptureError::StorageError(format!(
                "empty trim range {:?}..{:?}",
                range.start, range.end
            )));
        }

        export(output, spec, |out| {
            copy_range(&mut file, out, data_offset + start, end - start, cancel)
        })
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo, CaptureError> {
        let mut file = open(path)?;
        let layout = wav_format::read_layout(&mut file)?;
        let size_bytes = file
            .metadata()
            .map_err(|e| CaptureError::storage("failed to stat wav", e))?
            .len();
        Ok(MediaInfo {
            duration: layout.duration(),
            size_bytes,
        })
    }
}

fn open(path: &Path) -> Result<File, CaptureError> {
    File::open(path).map_err(|e| CaptureError::storage(&format!("failed to open {}", path.display()), e))
}

/// Write a header, let `body` append sample data, then seal the file.
/// The partial output is removed if anything fails.
fn export<F>(output: &Path, spec: WavSpec, body: F) -> Result<MediaInfo, CaptureError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<u64, CaptureError>,
{
    let result = (|| {
        let file =
            File::create(output).map_err(|e| CaptureError::storage("failed to create export", e))?;
        let mut out = BufWriter::new(file);
        out.write_all(&spec.header(0))
            .map_err(|e| CaptureError::storage("failed to write wav header", e))?;

        let data_bytes = body(&mut out)?;

        let mut file = out
            .into_inner()
            .map_err(|e| CaptureError::storage("failed to flush export", e.into_error()))?;
        wav_format::patch_sizes(&mut file, data_bytes)
            .map_err(|e| CaptureError::storage("failed to patch wav header", e))?;
        file.flush()
            .map_err(|e| CaptureError::storage("failed to flush export", e))?;

        Ok(MediaInfo {
            duration: spec.duration_of(data_bytes),
            size_bytes: WAV_HEADER_SIZE as u64 + data_bytes,
        })
    })();

    if result.is_err() {
        let _ = fs::remove_file(output);
    }
    result
}

fn copy_range<W: Write>(
    source: &mut File,
    out: &mut W,
    offset: u64,
    len: u64,
    cancel: &CancelToken,
) -> Result<u64, CaptureError> {
    source
        .seek(SeekFrom::Start(offset))
        .map_err(|e| CaptureError::storage("failed to seek source", e))?;

    let mut buf = vec![0u8; COPY_CHUNK_BYTES];
    let mut remaining = len;
    while remaining > 0 {
        cancel.check()?;
        let want = remaining.min(COPY_CHUNK_BYTES as u64) as usize;
        source
            .read_exact(&mut buf[..want])
            .map_err(|e| CaptureError::storage("failed to read source", e))?;
        out.write_all(&buf[..want])
            .map_err(|e| CaptureError::storage("failed to write export", e))?;
        remaining -= want as u64;
    }
    Ok(len)
}
