// ===============================
// src/recorder.rs
// ===============================
//
// Optional JSONL tap on the inbound frame stream:
// - One line per received frame, with a receive timestamp.
// - BufWriter to keep syscalls cheap, flushed once a second.
// - Reopens the file once on a failed write, then drops the frame.
//
// ENV: set `RECORD_FILE=/path/to/frames.jsonl` to enable (see main.rs).

use std::path::Path;

use serde::Serialize;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

/// One captured inbound frame, kept raw so the tape replays exactly what the
/// venue sent.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    pub ts_ms: i64,
    pub raw: String,
}

impl FrameRecord {
    pub fn now(raw: String) -> Self {
        Self {
            ts_ms: chrono::Utc::now().timestamp_millis(),
            raw,
        }
    }
}

async fn open_writer(path: &str) -> Option<BufWriter<tokio::fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(?e, %path, "recorder: create_dir_all failed");
            }
        }
    }
    match OpenOptions::new().create(true).append(true).open(path).await {
        Ok(file) => Some(BufWriter::new(file)),
        Err(e) => {
            error!(?e, %path, "recorder: open failed, recording disabled");
            None
        }
    }
}

pub async fn run(mut rx: mpsc::Receiver<FrameRecord>, path: String) {
    info!(%path, "recorder: started");
    let Some(mut writer) = open_writer(&path).await else { return };

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_rec = rx.recv() => {
                match maybe_rec {
                    Some(rec) => {
                        let mut line = match serde_json::to_string(&rec) {
                            Ok(s) => s,
                            Err(e) => {
                                error!(?e, "recorder: serialize error, skip frame");
                                continue;
                            }
                        };
                        line.push('\n');

                        if let Err(e) = writer.write_all(line.as_bytes()).await {
                            error!(?e, "recorder: write failed, attempting reopen");
                            let Some(w) = open_writer(&path).await else { return };
                            writer = w;
                            if let Err(e2) = writer.write_all(line.as_bytes()).await {
                                error!(?e2, "recorder: write failed again, drop frame");
                            }
                        }
                    }
                    None => {
                        // channel closed: flush and stop
                        let _ = writer.flush().await;
                        info!("recorder: channel closed, stopped");
                        break;
                    }
                }
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
            }
        }
    }
}
