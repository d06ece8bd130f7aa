use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, OnceLock};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriter;

const DEFAULT_MAX_LOG_LINES: usize = 1000;

static GLOBAL_LOG_BUFFER: OnceLock<LogBuffer> = OnceLock::new();

/// Ring of the most recent formatted log lines, served on `/logs`.
#[derive(Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_MAX_LOG_LINES
        } else {
            capacity
        };
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn ingest(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        let Ok(mut lines) = self.lines.lock() else {
            return;
        };
        for line in text.lines() {
            let line = strip_csi_sequences(line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if lines.len() == self.capacity {
                lines.pop_front();
            }
            lines.push_back(line.to_string());
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => {
                let skip = lines.len().saturating_sub(limit);
                lines.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }
}

pub fn global_log_buffer() -> Option<LogBuffer> {
    GLOBAL_LOG_BUFFER.get().cloned()
}

/// Installs the global subscriber: `RUST_LOG` filter (default `info`),
/// compact lines on stderr, mirrored into the in-memory buffer.
pub fn init_tracing(max_lines: usize) {
    let logs = GLOBAL_LOG_BUFFER
        .get_or_init(|| LogBuffer::new(max_lines))
        .clone();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_writer(MirroredStderr { logs })
        .init();
}

#[derive(Clone)]
struct MirroredStderr {
    logs: LogBuffer,
}

struct MirroredStderrWriter {
    logs: LogBuffer,
    stderr: io::Stderr,
}

impl<'a> MakeWriter<'a> for MirroredStderr {
    type Writer = MirroredStderrWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MirroredStderrWriter {
            logs: self.logs.clone(),
            stderr: io::stderr(),
        }
    }
}

impl Write for MirroredStderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.stderr.write(buf)?;
        self.logs.ingest(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stderr.flush()
    }
}

/// Drops ANSI color/style sequences (`ESC [ ... final`) and other control
/// characters the formatter emits for terminals.
fn strip_csi_sequences(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            if chars.peek() == Some(&'[') {
                chars.next();
                for terminal in chars.by_ref() {
                    if ('@'..='~').contains(&terminal) {
                        break;
                    }
                }
            }
            continue;
        }
        if !c.is_control() || c == '\t' {
            output.push(c);
        }
    }
    output
}
