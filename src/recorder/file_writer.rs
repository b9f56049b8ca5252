//! File-backed segment writer
//!
//! Writes each segment as a standalone file: one JSON header line describing
//! the session settings, followed by framed records
//! `[tag u8][pts value i64][timescale i32][len u32][payload]`, little-endian.

use super::state::{AudioSettings, SessionConfig, VideoSettings};
use super::writer::{SegmentOutput, SegmentWriter, SegmentWriterFactory, WriterError};
use crate::capture::traits::{MediaKind, MediaSample, MediaTime, PixelFormat, PixelFrame};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex as ParkingMutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const FORMAT: &str = "segrec-v1";

const TAG_AUDIO: u8 = 0;
const TAG_VIDEO: u8 = 1;
const TAG_PIXEL_FRAME: u8 = 2;

/// Tag, pts value, timescale and payload length
const RECORD_HEADER_LEN: u64 = 17;

/// Live sources flush small buffers often; offline sources batch more
const REALTIME_BUFFER: usize = 64 * 1024;
const OFFLINE_BUFFER: usize = 1024 * 1024;

/// First line of every segment file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentHeader {
    pub format: String,
    pub id: Uuid,
    pub index: u64,
    pub realtime: bool,
    pub audio: AudioSettings,
    pub video: VideoSettings,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Audio,
    Video,
    PixelFrame,
}

impl RecordKind {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_AUDIO => Some(RecordKind::Audio),
            TAG_VIDEO => Some(RecordKind::Video),
            TAG_PIXEL_FRAME => Some(RecordKind::PixelFrame),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    pub kind: RecordKind,
    pub pts: MediaTime,
    pub payload: Vec<u8>,
}

/// Decoded contents of a finalized segment file
#[derive(Debug, Clone)]
pub struct SegmentContents {
    pub header: SegmentHeader,
    pub records: Vec<SegmentRecord>,
}

/// Segment writer producing one file per segment
pub struct FileSegmentWriter {
    output: SegmentOutput,
    file: ParkingMutex<Option<BufWriter<File>>>,
    audio_finished: AtomicBool,
    video_finished: AtomicBool,
    record_count: AtomicU64,
    bytes_written: AtomicU64,
}

impl FileSegmentWriter {
    /// Create the segment file and write its header
    pub fn create(path: PathBuf, index: u64, config: &SessionConfig) -> Result<Self, WriterError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path).map_err(|source| WriterError::Open {
            path: path.clone(),
            source,
        })?;
        let capacity = if config.realtime {
            REALTIME_BUFFER
        } else {
            OFFLINE_BUFFER
        };
        let mut writer = BufWriter::with_capacity(capacity, file);

        let output = SegmentOutput::new(index, path);
        let header = SegmentHeader {
            format: FORMAT.to_string(),
            id: output.id,
            index,
            realtime: config.realtime,
            audio: config.audio.clone(),
            video: config.video.clone(),
            opened_at: output.opened_at,
        };
        serde_json::to_writer(&mut writer, &header).map_err(std::io::Error::from)?;
        writer.write_all(b"\n")?;

        tracing::debug!("Created segment file {:?}", output.location);

        Ok(Self {
            output,
            file: ParkingMutex::new(Some(writer)),
            audio_finished: AtomicBool::new(false),
            video_finished: AtomicBool::new(false),
            record_count: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        })
    }

    pub fn record_count(&self) -> u64 {
        self.record_count.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    fn finished(&self, channel: MediaKind) -> &AtomicBool {
        match channel {
            MediaKind::Audio => &self.audio_finished,
            MediaKind::Video => &self.video_finished,
        }
    }

    fn write_record(
        &self,
        channel: MediaKind,
        tag: u8,
        pts: MediaTime,
        prefix: &[u8],
        payload: &[u8],
    ) -> Result<(), WriterError> {
        if self.finished(channel).load(Ordering::SeqCst) {
            return Err(WriterError::Finished(channel));
        }

        let mut guard = self.file.lock();
        let writer = guard.as_mut().ok_or(WriterError::Finished(channel))?;

        let len = prefix.len() + payload.len();
        let len_field = u32::try_from(len).map_err(|_| {
            std::io::Error::new(ErrorKind::InvalidInput, format!("record of {len} bytes is too large"))
        })?;
        writer.write_all(&[tag])?;
        writer.write_all(&pts.value.to_le_bytes())?;
        writer.write_all(&pts.timescale.to_le_bytes())?;
        writer.write_all(&len_field.to_le_bytes())?;
        writer.write_all(prefix)?;
        writer.write_all(payload)?;

        self.record_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(RECORD_HEADER_LEN + len as u64, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl SegmentWriter for FileSegmentWriter {
    fn output(&self) -> &SegmentOutput {
        &self.output
    }

    fn is_ready(&self, channel: MediaKind) -> bool {
        !self.finished(channel).load(Ordering::SeqCst) && self.file.lock().is_some()
    }

    fn append_sample(&self, sample: &MediaSample) -> Result<(), WriterError> {
        let tag = match sample.kind {
            MediaKind::Audio => TAG_AUDIO,
            MediaKind::Video => TAG_VIDEO,
        };
        self.write_record(sample.kind, tag, sample.pts, &[], &sample.data)
    }

    fn append_pixel_frame(&self, frame: &PixelFrame) -> Result<(), WriterError> {
        let mut prefix = [0u8; 9];
        prefix[..4].copy_from_slice(&frame.width.to_le_bytes());
        prefix[4..8].copy_from_slice(&frame.height.to_le_bytes());
        prefix[8] = match frame.format {
            PixelFormat::Bgra => 0,
            PixelFormat::Nv12 => 1,
            PixelFormat::Yuv420p => 2,
        };
        self.write_record(MediaKind::Video, TAG_PIXEL_FRAME, frame.pts, &prefix, &frame.data)
    }

    fn mark_finished(&self, channel: MediaKind) {
        self.finished(channel).store(true, Ordering::SeqCst);
    }

    async fn finalize(&self) -> Result<PathBuf, WriterError> {
        self.mark_finished(MediaKind::Audio);
        self.mark_finished(MediaKind::Video);

        let writer = self
            .file
            .lock()
            .take()
            .ok_or_else(|| WriterError::Finalize("segment already finalized".to_string()))?;
        let location = self.output.location.clone();
        let records = self.record_count();

        let location = tokio::task::spawn_blocking(move || -> Result<PathBuf, WriterError> {
            let file = writer.into_inner().map_err(|e| WriterError::Io(e.into_error()))?;
            file.sync_all()?;
            Ok(location)
        })
        .await
        .map_err(|e| WriterError::Finalize(e.to_string()))??;

        tracing::debug!(
            "Closed segment file {:?}: {} records, {} bytes",
            location,
            records,
            self.bytes_written()
        );
        Ok(location)
    }
}

/// Creates `segment-NNNNN.seg` files in the session's output directory
#[derive(Debug, Default, Clone)]
pub struct FileSegmentWriterFactory;

impl FileSegmentWriterFactory {
    pub fn segment_path(output_dir: &Path, index: u64) -> PathBuf {
        output_dir.join(format!("segment-{index:05}.seg"))
    }
}

impl SegmentWriterFactory for FileSegmentWriterFactory {
    fn create(
        &self,
        index: u64,
        config: &SessionConfig,
    ) -> Result<Arc<dyn SegmentWriter>, WriterError> {
        let path = Self::segment_path(&config.output_dir, index);
        Ok(Arc::new(FileSegmentWriter::create(path, index, config)?))
    }
}

/// Read back a segment file written by `FileSegmentWriter`
pub fn read_segment(path: &Path) -> Result<SegmentContents, WriterError> {
    let file = File::open(path)?;
    let mut remaining = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut line = String::new();
    remaining = remaining.saturating_sub(reader.read_line(&mut line)? as u64);
    let header: SegmentHeader =
        serde_json::from_str(line.trim_end()).map_err(std::io::Error::from)?;

    let mut records = Vec::new();
    loop {
        let mut tag = [0u8; 1];
        match reader.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let kind = RecordKind::from_tag(tag[0]).ok_or_else(|| {
            std::io::Error::new(ErrorKind::InvalidData, format!("unknown record tag {}", tag[0]))
        })?;

        let mut value = [0u8; 8];
        let mut timescale = [0u8; 4];
        let mut len = [0u8; 4];
        reader.read_exact(&mut value)?;
        reader.read_exact(&mut timescale)?;
        reader.read_exact(&mut len)?;
        remaining = remaining.saturating_sub(RECORD_HEADER_LEN);

        let len = u32::from_le_bytes(len) as u64;
        if len > remaining {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("record of {len} bytes overruns the {remaining} bytes left in the file"),
            )
            .into());
        }
        remaining -= len;

        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload)?;
        records.push(SegmentRecord {
            kind,
            pts: MediaTime::new(i64::from_le_bytes(value), i32::from_le_bytes(timescale)),
            payload,
        });
    }

    Ok(SegmentContents { header, records })
}
