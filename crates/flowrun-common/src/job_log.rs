// Per-job log files. Every step gets its own timestamped log under
// `_logs/<run-id>/`, with oversized steps rolling over to numbered pages.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Maximum size of a single log page in bytes (8 MB).
pub const PAGE_SIZE: usize = 8 * 1024 * 1024;

/// Writes job output to per-step log files on disk.
///
/// Each line is prepended with a UTC timestamp. A step's log rolls over to a
/// new page file once it passes `PAGE_SIZE` bytes.
pub struct JobLogWriter {
    run_directory: PathBuf,
    run_id: Uuid,

    step_file_stem: Option<String>,
    writer: Option<BufWriter<File>>,
    page_byte_count: usize,
    page_count: u32,
    total_lines: u64,
}

impl JobLogWriter {
    /// Create a writer for one job run under the given logs directory.
    pub fn new(logs_directory: &Path, run_id: Uuid) -> Result<Self> {
        let run_directory = logs_directory.join(run_id.as_simple().to_string());
        fs::create_dir_all(&run_directory).with_context(|| {
            format!("Failed to create log directory {}", run_directory.display())
        })?;

        Ok(Self {
            run_directory,
            run_id,
            step_file_stem: None,
            writer: None,
            page_byte_count: 0,
            page_count: 0,
            total_lines: 0,
        })
    }

    /// The run identifier this writer logs for.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The directory holding this run's log files.
    pub fn run_directory(&self) -> &Path {
        &self.run_directory
    }

    /// Total number of lines written across all steps.
    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    /// Switch output to a new step log file.
    pub fn begin_step(&mut self, step_number: u32, step_name: &str) {
        self.end_step();
        self.step_file_stem = Some(format!(
            "{:02}_{}",
            step_number,
            sanitize_file_stem(step_name)
        ));
        self.page_count = 0;
        self.new_page();
    }

    /// Flush and close the current step's log file.
    pub fn end_step(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
        self.step_file_stem = None;
    }

    /// Write a message to the current step's log, prefixed with a UTC timestamp.
    ///
    /// Messages written outside a step are dropped.
    pub fn write(&mut self, message: &str) {
        if self.writer.is_none() {
            return;
        }

        let line = format!("{} {}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ"), message);
        if let Some(ref mut writer) = self.writer {
            let _ = writeln!(writer, "{}", line);
        }

        self.total_lines += 1;
        self.page_byte_count += line.len() + 1;
        if self.page_byte_count >= PAGE_SIZE {
            self.new_page();
        }
    }

    fn new_page(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
        self.page_byte_count = 0;
        self.page_count += 1;

        let stem = match self.step_file_stem {
            Some(ref stem) => stem,
            None => return,
        };

        let file_name = if self.page_count == 1 {
            format!("{}.log", stem)
        } else {
            format!("{}_{}.log", stem, self.page_count)
        };
        let path = self.run_directory.join(file_name);

        match File::create(&path) {
            Ok(file) => self.writer = Some(BufWriter::new(file)),
            Err(e) => tracing::error!("Failed to create log file {:?}: {}", path, e),
        }
    }
}

impl Drop for JobLogWriter {
    fn drop(&mut self) {
        self.end_step();
    }
}

/// Reduce a step display name to a safe file name stem.
fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "step".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_timestamped_lines_per_step() {
        let tmp = tempfile::tempdir().unwrap();
        let run_id = Uuid::new_v4();
        let mut log = JobLogWriter::new(tmp.path(), run_id).unwrap();

        log.begin_step(1, "Run tests");
        log.write("hello");
        log.write("world");
        log.end_step();

        let file = log.run_directory().join("01_Run_tests.log");
        let content = fs::read_to_string(&file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" hello"));
        assert!(lines[1].ends_with(" world"));
        // Timestamp prefix is valid RFC 3339 with fractional seconds.
        let stamp = lines[0].split(' ').next().unwrap();
        chrono::DateTime::parse_from_rfc3339(stamp).unwrap();
        assert!(stamp.contains('.'));
        assert_eq!(log.total_lines(), 2);
    }

    #[test]
    fn separate_files_per_step() {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = JobLogWriter::new(tmp.path(), Uuid::new_v4()).unwrap();

        log.begin_step(1, "checkout");
        log.write("a");
        log.begin_step(2, "build");
        log.write("b");
        log.end_step();

        assert!(log.run_directory().join("01_checkout.log").is_file());
        assert!(log.run_directory().join("02_build.log").is_file());
    }

    #[test]
    fn writes_outside_steps_are_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = JobLogWriter::new(tmp.path(), Uuid::new_v4()).unwrap();
        log.write("ignored");
        assert_eq!(log.total_lines(), 0);
    }

    #[test]
    fn sanitizes_step_names() {
        assert_eq!(sanitize_file_stem("Run script/randomized-test-ci"), "Run_script_randomized-test-ci");
        assert_eq!(sanitize_file_stem(""), "step");
    }
}
