//! Durable job records.
//!
//! The orchestrator saves a job after every state or position change and
//! relies on that save having completed before it moves on. [`FileJobStore`]
//! keeps one JSON document per job and replaces it atomically;
//! [`InMemoryJobStore`] is for tests and embedding.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use dashmap::DashMap;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::WfeError;
use crate::state_machine::Job;

/// Persistence contract for job records.
pub trait JobStore: Send + Sync {
    fn load(&self, id: Uuid) -> Result<Job, WfeError>;

    /// Must be durable when it returns.
    fn save(&self, job: &Job) -> Result<(), WfeError>;

    fn list(&self) -> Result<Vec<Job>, WfeError>;
}

/// Stores each job as `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, WfeError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl JobStore for FileJobStore {
    fn load(&self, id: Uuid) -> Result<Job, WfeError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(WfeError::JobNotFound(id));
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, job: &Job) -> Result<(), WfeError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, job)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(job.id)).map_err(|e| WfeError::Io(e.error))?;
        tracing::trace!(job_id = %job.id, state = %job.state, "job saved");
        Ok(())
    }

    fn list(&self) -> Result<Vec<Job>, WfeError> {
        let mut jobs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            match serde_json::from_str::<Job>(&contents) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping unreadable job record"
                ),
            }
        }
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: DashMap<Uuid, Job>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn load(&self, id: Uuid) -> Result<Job, WfeError> {
        self.inner
            .get(&id)
            .map(|j| j.clone())
            .ok_or(WfeError::JobNotFound(id))
    }

    fn save(&self, job: &Job) -> Result<(), WfeError> {
        self.inner.insert(job.id, job.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Job>, WfeError> {
        let mut jobs: Vec<Job> = self.inner.iter().map(|j| j.value().clone()).collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::JobState;
    use serde_json::json;
    use tempfile::TempDir;

    fn make_job() -> Job {
        let mut job = Job::new(
            "wfe.demo.Review".into(),
            Some("wfe.steps.__start__".into()),
            PathBuf::from("review.log"),
        );
        job.record_result("wfe.demo.Draft", json!({"title": "hello"}));
        job.current_step_index = 1;
        job.state = JobState::InputRequired;
        job
    }

    #[test]
    fn file_store_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::open(tmp.path().join("jobs")).unwrap();
        let job = make_job();
        store.save(&job).unwrap();

        let loaded = store.load(job.id).unwrap();
        assert_eq!(loaded, job);
        assert_eq!(loaded.state, JobState::InputRequired);
        assert_eq!(loaded.current_step_index, 1);
    }

    #[test]
    fn file_store_overwrites_in_place() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::open(tmp.path()).unwrap();
        let mut job = make_job();
        store.save(&job).unwrap();
        job.state = JobState::InputReceived;
        store.save(&job).unwrap();

        assert_eq!(store.load(job.id).unwrap().state, JobState::InputReceived);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn file_store_list_skips_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::open(tmp.path()).unwrap();
        store.save(&make_job()).unwrap();
        store.save(&make_job()).unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignore me").unwrap();
        fs::write(tmp.path().join("broken.json"), "{").unwrap();

        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn missing_job_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::open(tmp.path()).unwrap();
        let id = Uuid::new_v4();
        assert!(matches!(store.load(id), Err(WfeError::JobNotFound(got)) if got == id));
        assert!(matches!(InMemoryJobStore::new().load(id), Err(WfeError::JobNotFound(_))));
    }

    #[test]
    fn in_memory_store_returns_copies() {
        let store = InMemoryJobStore::new();
        let mut job = make_job();
        store.save(&job).unwrap();
        job.state = JobState::Failed;
        assert_eq!(store.load(job.id).unwrap().state, JobState::InputRequired);
    }
}
