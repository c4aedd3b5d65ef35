//! Where extracted pieces are written.
//!
//! `PieceSink` is the seam between slicing and storage: the extractor hands
//! over planar samples already normalized to [-1, 1], the sink encodes them
//! as 16-bit PCM WAV and reports what it wrote.

use std::fs;
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::Result;

pub const OUTPUT_BITS_PER_SAMPLE: u16 = 16;

/// Facts about one persisted piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPiece {
    pub filename: String,
    /// Location as the caller should report it (e.g. volume-relative).
    pub file_path: String,
    pub file_size_bytes: u64,
}

/// Destination for encoded pieces.
pub trait PieceSink {
    fn write_piece(
        &mut self,
        piece_index: usize,
        channels: &[Vec<f32>],
        sample_rate: u32,
    ) -> Result<WrittenPiece>;
}

/// Writes `<piece_index>.wav` files into a directory.
#[derive(Debug, Clone)]
pub struct WavDirSink {
    dir: PathBuf,
    /// Prefix used for `WrittenPiece::file_path`.
    label_prefix: String,
}

impl WavDirSink {
    /// Creates `dir` if needed.
    pub fn create(dir: impl Into<PathBuf>, label_prefix: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            label_prefix: label_prefix.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PieceSink for WavDirSink {
    fn write_piece(
        &mut self,
        piece_index: usize,
        channels: &[Vec<f32>],
        sample_rate: u32,
    ) -> Result<WrittenPiece> {
        let filename = format!("{piece_index}.wav");
        let path = self.dir.join(&filename);

        let writer = WavWriter::create(&path, pcm16_spec(channels.len(), sample_rate))?;
        write_interleaved(writer, channels)?;

        let file_size_bytes = fs::metadata(&path)?.len();
        let file_path = if self.label_prefix.is_empty() {
            filename.clone()
        } else {
            format!("{}/{}", self.label_prefix.trim_end_matches('/'), filename)
        };

        Ok(WrittenPiece {
            filename,
            file_path,
            file_size_bytes,
        })
    }
}

/// Keeps encoded pieces in memory, keyed by piece index.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub files: Vec<(usize, Vec<u8>)>,
}

impl PieceSink for MemorySink {
    fn write_piece(
        &mut self,
        piece_index: usize,
        channels: &[Vec<f32>],
        sample_rate: u32,
    ) -> Result<WrittenPiece> {
        let mut cursor = Cursor::new(Vec::new());
        let writer = WavWriter::new(&mut cursor, pcm16_spec(channels.len(), sample_rate))?;
        write_interleaved(writer, channels)?;

        let bytes = cursor.into_inner();
        let filename = format!("{piece_index}.wav");
        let written = WrittenPiece {
            file_path: filename.clone(),
            filename,
            file_size_bytes: bytes.len() as u64,
        };
        self.files.push((piece_index, bytes));
        Ok(written)
    }
}

fn pcm16_spec(channels: usize, sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: OUTPUT_BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    }
}

fn write_interleaved<W: Write + Seek>(mut writer: WavWriter<W>, channels: &[Vec<f32>]) -> Result<()> {
    let frames = channels.first().map_or(0, Vec::len);
    for i in 0..frames {
        for ch in channels {
            writer.write_sample(to_pcm16(ch[i]))?;
        }
    }
    writer.finalize()?;
    Ok(())
}

fn to_pcm16(s: f32) -> i16 {
    (s * 32_768.0).round().clamp(-32_768.0, 32_767.0) as i16
}
