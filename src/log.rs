//! Per-job append-only execution log.
//!
//! Each job owns one text file, `<log_dir>/<workflow name>_<job id>.log`.
//! Orchestrator messages are appended as timestamped lines; step output is
//! tee'd in through a [`LogCapture`] that is opened for the duration of one
//! `execute()`/`transition()` call and flushed when it goes out of scope.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use uuid::Uuid;

use crate::error::WfeError;

/// Handle to a job's log file. Cheap to construct; the file is opened per write.
#[derive(Debug, Clone)]
pub struct ExecutionLog {
    path: PathBuf,
}

impl ExecutionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Stable log location for a job of the given workflow.
    pub fn path_for(log_dir: &Path, workflow_name: &str, job_id: Uuid) -> PathBuf {
        log_dir.join(format!("{workflow_name}_{job_id}.log"))
    }

    /// Appends a timestamped line.
    pub fn append(&self, message: &str) -> Result<(), WfeError> {
        let mut file = self.open()?;
        writeln!(file, "{} {message}", Local::now().format("%Y-%m-%d %H:%M:%S%.6f"))?;
        Ok(())
    }

    /// Appends text verbatim, used for fault traces.
    pub fn append_raw(&self, text: &str) -> Result<(), WfeError> {
        let mut file = self.open()?;
        file.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Opens a capture scope that duplicates writes into the log and,
    /// if `echo` is set, onto stdout.
    pub fn capture(&self, echo: bool) -> Result<LogCapture, WfeError> {
        Ok(LogCapture {
            file: BufWriter::new(self.open()?),
            echo,
        })
    }

    /// Full log contents, empty if nothing was written yet.
    pub fn read(&self) -> Result<String, WfeError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

/// Scoped tee into a job's log. Flushed on drop, whatever way the scope ends.
pub struct LogCapture {
    file: BufWriter<File>,
    echo: bool,
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if self.echo {
            io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.echo {
            io::stdout().flush()?;
        }
        Ok(())
    }
}

impl Drop for LogCapture {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "failed to flush captured step output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn path_uses_workflow_name_and_job_id() {
        let id = Uuid::nil();
        let path = ExecutionLog::path_for(Path::new("/var/log/wfe"), "review", id);
        assert_eq!(
            path,
            PathBuf::from(format!("/var/log/wfe/review_{id}.log"))
        );
    }

    #[test]
    fn append_is_timestamped_and_ordered() {
        let tmp = TempDir::new().unwrap();
        let log = ExecutionLog::new(tmp.path().join("nested/job.log"));
        log.append("first").unwrap();
        log.append("second").unwrap();

        let contents = log.read().unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" first"));
        assert!(lines[1].ends_with(" second"));
        // "YYYY-mm-dd HH:MM:SS.ffffff"
        assert_eq!(lines[0].find(" first"), Some(26));
    }

    #[test]
    fn capture_flushes_on_drop() {
        let tmp = TempDir::new().unwrap();
        let log = ExecutionLog::new(tmp.path().join("job.log"));
        {
            let mut capture = log.capture(false).unwrap();
            write!(capture, "captured output").unwrap();
        }
        log.append_raw("trace line").unwrap();
        assert_eq!(log.read().unwrap(), "captured outputtrace line\n");
    }

    #[test]
    fn capture_survives_panicking_scope() {
        let tmp = TempDir::new().unwrap();
        let log = ExecutionLog::new(tmp.path().join("job.log"));
        let result = std::panic::catch_unwind(|| {
            let mut capture = log.capture(false).unwrap();
            writeln!(capture, "before panic").unwrap();
            panic!("step blew up");
        });
        assert!(result.is_err());
        assert_eq!(log.read().unwrap(), "before panic\n");
    }

    #[test]
    fn read_missing_log_is_empty() {
        let tmp = TempDir::new().unwrap();
        let log = ExecutionLog::new(tmp.path().join("absent.log"));
        assert_eq!(log.read().unwrap(), "");
    }
}
