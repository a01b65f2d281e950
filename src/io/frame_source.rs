//! JSONL frame input
//!
//! One record per line: `{"resolution": [w, h], "points": [[x, y], ...]}`.
//! `resolution` is optional and only needs to appear when it changes.
//! Blank or unparsable lines are skipped.

use crate::domain::types::{Point, Resolution};
use anyhow::Context;
use serde::Deserialize;
use std::io::BufRead;
use std::thread;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameRecord {
    #[serde(default)]
    resolution: Option<[u32; 2]>,
    #[serde(default)]
    points: Vec<[f64; 2]>,
}

impl FrameRecord {
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution.map(Resolution::from)
    }

    /// Tracked points, truncated to pixel coordinates
    pub fn points(&self) -> Vec<Point> {
        self.points.iter().map(|&[x, y]| Point::new(x as i32, y as i32)).collect()
    }
}

/// Parse one line; `None` for blank or malformed input
pub fn parse_frame_line(line: &str) -> Option<FrameRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(error = %e, "frame_line_skipped");
            None
        }
    }
}

/// Lines buffered between the stdin reader thread and the frame loop
const STDIN_LINE_BUFFER: usize = 256;

type BoxedInput = Box<dyn AsyncRead + Unpin + Send>;

enum LineSource {
    Async(Lines<BufReader<BoxedInput>>),
    /// Fed by a dedicated OS thread. Dropping the receiver never waits on it.
    Thread(mpsc::Receiver<std::io::Result<String>>),
}

pub struct FrameReader {
    source: LineSource,
}

impl FrameReader {
    pub fn new<R: AsyncRead + Unpin + Send + 'static>(input: R) -> Self {
        let input: BoxedInput = Box::new(input);
        Self { source: LineSource::Async(BufReader::new(input).lines()) }
    }

    /// Read `input` line by line on its own OS thread.
    ///
    /// Used for blocking sources such as stdin, whose reads cannot be
    /// cancelled: the thread is detached, so a pending read does not hold up
    /// runtime shutdown.
    pub fn spawn_line_reader<B: BufRead + Send + 'static>(input: B) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel(STDIN_LINE_BUFFER);
        thread::Builder::new()
            .name("frame-reader".to_string())
            .spawn(move || {
                for line in input.lines() {
                    let failed = line.is_err();
                    if tx.blocking_send(line).is_err() || failed {
                        break;
                    }
                }
                debug!("frame_reader_thread_exited");
            })
            .context("Failed to spawn frame reader thread")?;
        Ok(Self { source: LineSource::Thread(rx) })
    }

    async fn next_line(&mut self) -> anyhow::Result<Option<String>> {
        match &mut self.source {
            LineSource::Async(lines) => {
                lines.next_line().await.context("Failed to read frame input")
            }
            LineSource::Thread(rx) => match rx.recv().await {
                Some(line) => line.map(Some).context("Failed to read frame input"),
                None => Ok(None),
            },
        }
    }

    /// Next well-formed record, `None` at end of input
    pub async fn next_frame(&mut self) -> anyhow::Result<Option<FrameRecord>> {
        while let Some(line) = self.next_line().await? {
            if let Some(record) = parse_frame_line(&line) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

/// Open `path` for reading frames; `-` is stdin
pub async fn open_frames(path: &str) -> anyhow::Result<FrameReader> {
    if path == "-" {
        return FrameReader::spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    }
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open frames file {path}"))?;
    Ok(FrameReader::new(file))
}
