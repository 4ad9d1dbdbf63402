//! Simple logger implementation for early boot
//!
//! Formats each record into a fixed stack buffer (no allocation, truncating)
//! and forwards it to the console sink registered by the platform. The last
//! `LOG_RING_LINES` lines are kept in memory so they can be replayed once a
//! real console shows up.

use core::fmt::Write;

use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use spin::{Mutex, Once};

/// Longueur maximale d'une ligne formatée
pub const LOG_LINE_LEN: usize = 256;

/// Nombre de lignes conservées pour relecture
pub const LOG_RING_LINES: usize = 64;

/// Byte sink of the boot console (serial, hvc, ...)
pub type ConsoleSink = fn(&[u8]);

/// Simple buffer writer for formatting without alloc
pub struct BufferWriter<'a> {
    pub buffer: &'a mut [u8],
    pub pos: usize,
}

impl<'a> BufferWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.pos]
    }
}

impl Write for BufferWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buffer.len() - self.pos;
        let to_write = bytes.len().min(remaining);

        if to_write > 0 {
            self.buffer[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
        }

        Ok(())
    }
}

/// Anneau des dernières lignes de log
pub struct LogRing {
    lines: [[u8; LOG_LINE_LEN]; LOG_RING_LINES],
    lens: [usize; LOG_RING_LINES],
    head: usize,
    count: usize,
}

impl LogRing {
    pub const fn new() -> Self {
        Self {
            lines: [[0; LOG_LINE_LEN]; LOG_RING_LINES],
            lens: [0; LOG_RING_LINES],
            head: 0,
            count: 0,
        }
    }

    pub fn push(&mut self, line: &[u8]) {
        let len = line.len().min(LOG_LINE_LEN);
        self.lines[self.head][..len].copy_from_slice(&line[..len]);
        self.lens[self.head] = len;
        self.head = (self.head + 1) % LOG_RING_LINES;
        self.count = (self.count + 1).min(LOG_RING_LINES);
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Oldest line first
    pub fn for_each(&self, mut f: impl FnMut(&[u8])) {
        let start = (self.head + LOG_RING_LINES - self.count) % LOG_RING_LINES;
        for i in 0..self.count {
            let slot = (start + i) % LOG_RING_LINES;
            f(&self.lines[slot][..self.lens[slot]]);
        }
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Logger that writes to the boot console and the replay ring
struct EarlyLogger {
    sink: Once<ConsoleSink>,
    ring: Mutex<LogRing>,
}

impl log::Log for EarlyLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut buf = [0u8; LOG_LINE_LEN];
        let line = format_line(&mut buf, record);

        if let Some(sink) = self.sink.get() {
            sink(line);
        }
        self.ring.lock().push(line);
    }

    fn flush(&self) {}
}

/// Formats `[LEVEL] target: message\n` into `buf`.
///
/// Long messages are truncated; the newline always survives.
fn format_line<'b>(buf: &'b mut [u8; LOG_LINE_LEN], record: &Record<'_>) -> &'b [u8] {
    let level_str = match record.level() {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    };

    let len = {
        let mut writer = BufferWriter::new(&mut buf[..LOG_LINE_LEN - 1]);
        let _ = write!(writer, "[{}] {}: {}", level_str, record.target(), record.args());
        writer.pos
    };
    buf[len] = b'\n';
    &buf[..=len]
}

/// Global logger instance
static LOGGER: EarlyLogger = EarlyLogger {
    sink: Once::new(),
    ring: Mutex::new(LogRing::new()),
};

/// Initialize the logger
///
/// Call this very early in the boot process, before NUMA init.
pub fn init(sink: ConsoleSink, level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    LOGGER.sink.call_once(|| sink);
    log::set_max_level(level);
    Ok(())
}

/// Replays the retained lines, oldest first
pub fn replay(f: impl FnMut(&[u8])) {
    LOGGER.ring.lock().for_each(f);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_buffer_writer_truncates() {
        let mut buf = [0u8; 8];
        let mut writer = BufferWriter::new(&mut buf);
        write!(writer, "{}-{}", "vnuma", 12345).unwrap();
        assert_eq!(writer.as_bytes(), b"vnuma-12");
    }

    #[test]
    fn test_truncated_line_keeps_newline() {
        let long = "x".repeat(2 * LOG_LINE_LEN);
        let mut buf = [0u8; LOG_LINE_LEN];
        let line = format_line(
            &mut buf,
            &Record::builder()
                .args(format_args!("{}", long))
                .level(Level::Warn)
                .target("vnuma")
                .build(),
        );
        assert_eq!(line.len(), LOG_LINE_LEN);
        assert!(line.starts_with(b"[WARN ] vnuma: xxx"));
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    #[test]
    fn test_ring_keeps_last_lines() {
        let mut ring = LogRing::new();
        assert!(ring.is_empty());
        for i in 0..LOG_RING_LINES + 3 {
            let mut buf = [0u8; 16];
            let mut writer = BufferWriter::new(&mut buf);
            write!(writer, "line {}", i).unwrap();
            ring.push(writer.as_bytes());
        }
        assert_eq!(ring.len(), LOG_RING_LINES);

        let mut lines = Vec::new();
        ring.for_each(|l| lines.push(l.to_vec()));
        assert_eq!(lines.first().unwrap().as_slice(), b"line 3");
        assert_eq!(
            lines.last().unwrap().as_slice(),
            alloc::format!("line {}", LOG_RING_LINES + 2).as_bytes()
        );
    }

    #[test]
    fn test_logger_records_into_ring() {
        fn discard(_: &[u8]) {}
        init(discard, LevelFilter::Info).unwrap();
        assert!(init(discard, LevelFilter::Info).is_err());

        log::info!(target: "vnuma", "logger ring check");
        let mut found = false;
        replay(|line| found |= line == b"[INFO ] vnuma: logger ring check\n");
        assert!(found);
    }
}
