use futures_util::{StreamExt, TryStreamExt};
use std::io;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

/// Event id the device sends when panels are added, removed or moved.
pub const LAYOUT_EVENT_ID: u32 = 2;

const MAX_LINE_BYTES: usize = 4096;

/// Extracts the event id from an `id:` line of the stream.
pub fn parse_event_id(line: &str) -> Option<u32> {
    line.strip_prefix("id:")?.trim().parse().ok()
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Drained {
    pub event_ids: Vec<u32>,
    /// The device closed the stream or the read failed.
    pub closed: bool,
}

/// Lines of an open event stream, read on a background task.
pub struct EventStream {
    lines: mpsc::UnboundedReceiver<String>,
    reader: JoinHandle<()>,
}

impl EventStream {
    pub fn spawn(response: reqwest::Response) -> Self {
        let body = response.bytes_stream().map_err(io::Error::other);
        let (tx, lines) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            let mut framed = std::pin::pin!(FramedRead::new(
                StreamReader::new(body),
                LinesCodec::new_with_max_length(MAX_LINE_BYTES),
            ));
            while let Some(line) = framed.next().await {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Event stream read failed: {}", e);
                        return;
                    }
                }
            }
            debug!("Event stream ended");
        });

        EventStream { lines, reader }
    }

    /// Takes every pending line without waiting.
    pub fn drain(&mut self) -> Drained {
        let mut drained = Drained::default();
        loop {
            match self.lines.try_recv() {
                Ok(line) => {
                    if let Some(id) = parse_event_id(&line) {
                        drained.event_ids.push(id);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    drained.closed = true;
                    break;
                }
            }
        }
        drained
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
