//! In-memory store and scripted backend for engine integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use capstudio_core::config::VisionConfig;
use capstudio_core::error::CoreError;
use capstudio_core::job::{CaptionSet, DatasetMember, GeneratedCaption, Job};
use capstudio_core::prompt::CaptionStyle;
use capstudio_core::status::JobStatus;
use capstudio_core::store::{CaptionStore, DatasetStore, JobStore};
use capstudio_core::types::Id;
use capstudio_engine::controller::JobController;
use capstudio_vision::backend::{BackendRegistry, GenerateRequest, VisionBackend};
use tokio::sync::Semaphore;

pub const BACKEND_ID: &str = "scripted";

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    jobs: HashMap<Id, Job>,
    sets: HashMap<Id, CaptionSet>,
    members: HashMap<Id, Vec<DatasetMember>>,
    paths: HashMap<Id, PathBuf>,
    captions: HashMap<(Id, Id), GeneratedCaption>,
    quality: HashMap<(Id, Id), (f64, Option<Vec<String>>)>,
}

/// Store implementation backed by hash maps, mirroring the Postgres
/// store's semantics (guarded transitions, upsert keep-previous rules).
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn insert_caption_set(&self, set: CaptionSet) {
        self.inner.lock().unwrap().sets.insert(set.id, set);
    }

    pub fn remove_caption_set(&self, id: Id) {
        self.inner.lock().unwrap().sets.remove(&id);
    }

    pub fn insert_member(&self, dataset_id: Id, member: DatasetMember, path: PathBuf) {
        let mut inner = self.inner.lock().unwrap();
        inner.members.entry(dataset_id).or_default().push(member);
        inner.paths.insert(member.file_id, path);
    }

    pub fn remove_path(&self, file_id: Id) {
        self.inner.lock().unwrap().paths.remove(&file_id);
    }

    pub fn member_quality(&self, dataset_id: Id, file_id: Id) -> Option<(f64, Option<Vec<String>>)> {
        self.inner
            .lock()
            .unwrap()
            .quality
            .get(&(dataset_id, file_id))
            .cloned()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &Job) -> Result<(), CoreError> {
        self.inner.lock().unwrap().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_job(&self, id: Id) -> Result<Option<Job>, CoreError> {
        Ok(self.inner.lock().unwrap().jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>, CoreError> {
        let inner = self.inner.lock().unwrap();
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn transition_job(
        &self,
        id: Id,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<Option<Job>, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(None);
        };
        if from.contains(&job.status) {
            job.status = to;
            if to.is_terminal() {
                job.completed_at = Some(Utc::now());
            }
        }
        Ok(Some(job.clone()))
    }

    async fn mark_job_started(&self, id: Id) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&id) {
            if matches!(job.status, JobStatus::Pending | JobStatus::Running) {
                job.status = JobStatus::Running;
                job.started_at.get_or_insert_with(Utc::now);
            }
        }
        Ok(())
    }

    async fn set_current_file(&self, id: Id, file_id: Option<Id>) -> Result<(), CoreError> {
        if let Some(job) = self.inner.lock().unwrap().jobs.get_mut(&id) {
            job.current_file_id = file_id;
        }
        Ok(())
    }

    async fn update_job_counters(
        &self,
        id: Id,
        completed: i32,
        failed: i32,
        last_error: Option<&str>,
    ) -> Result<(), CoreError> {
        if let Some(job) = self.inner.lock().unwrap().jobs.get_mut(&id) {
            job.completed_files = completed;
            job.failed_files = failed;
            if let Some(error) = last_error {
                job.last_error = Some(error.to_string());
            }
        }
        Ok(())
    }

    async fn fail_job(&self, id: Id, error: &str) -> Result<(), CoreError> {
        if let Some(job) = self.inner.lock().unwrap().jobs.get_mut(&id) {
            job.status = JobStatus::Failed;
            job.last_error = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl CaptionStore for MemoryStore {
    async fn upsert_caption(&self, caption: &GeneratedCaption) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (caption.caption_set_id, caption.file_id);
        let mut next = caption.clone();
        // Keep the previous translation when the new one is absent.
        if next.caption_ru.is_none() {
            if let Some(previous) = inner.captions.get(&key) {
                next.caption_ru = previous.caption_ru.clone();
            }
        }
        inner.captions.insert(key, next);
        Ok(())
    }

    async fn find_caption(
        &self,
        caption_set_id: Id,
        file_id: Id,
    ) -> Result<Option<GeneratedCaption>, CoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .captions
            .get(&(caption_set_id, file_id))
            .cloned())
    }

    async fn captioned_file_ids(&self, caption_set_id: Id) -> Result<Vec<Id>, CoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .captions
            .keys()
            .filter(|(set, _)| *set == caption_set_id)
            .map(|(_, file)| *file)
            .collect())
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    async fn find_caption_set(&self, id: Id) -> Result<Option<CaptionSet>, CoreError> {
        Ok(self.inner.lock().unwrap().sets.get(&id).cloned())
    }

    async fn eligible_members(&self, dataset_id: Id) -> Result<Vec<DatasetMember>, CoreError> {
        let mut members = self
            .inner
            .lock()
            .unwrap()
            .members
            .get(&dataset_id)
            .cloned()
            .unwrap_or_default();
        members.sort_by_key(|m| (m.order_index, m.file_id));
        Ok(members)
    }

    async fn resolve_path(&self, file_id: Id) -> Result<Option<PathBuf>, CoreError> {
        Ok(self.inner.lock().unwrap().paths.get(&file_id).cloned())
    }

    async fn set_member_quality(
        &self,
        dataset_id: Id,
        file_id: Id,
        score: f64,
        flags: Option<&[String]>,
    ) -> Result<(), CoreError> {
        self.inner
            .lock()
            .unwrap()
            .quality
            .insert((dataset_id, file_id), (score, flags.map(<[String]>::to_vec)));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// Backend that replays a queue of scripted replies. An optional gate
/// blocks each call until the test releases a permit, making pause and
/// cancel timing deterministic.
#[derive(Debug)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, CoreError>>>,
    calls: AtomicUsize,
    gate: Option<Semaphore>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Every `generate` call waits for one released permit.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn push_reply(&self, reply: Result<String, CoreError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn release(&self, permits: usize) {
        self.gate
            .as_ref()
            .expect("backend is not gated")
            .add_permits(permits);
    }

    /// Number of `generate` calls started (including ones still gated).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionBackend for ScriptedBackend {
    fn id(&self) -> &'static str {
        BACKEND_ID
    }

    async fn generate(&self, _request: GenerateRequest<'_>) -> Result<String, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json_reply("a scripted caption", 0.8)))
    }
}

pub struct ScriptedRegistry {
    backend: Arc<ScriptedBackend>,
}

impl ScriptedRegistry {
    pub fn new(backend: Arc<ScriptedBackend>) -> Self {
        Self { backend }
    }
}

impl BackendRegistry for ScriptedRegistry {
    fn resolve(&self, id: &str) -> Result<Arc<dyn VisionBackend>, CoreError> {
        if id == BACKEND_ID {
            Ok(self.backend.clone())
        } else {
            Err(CoreError::Invalid(format!(
                "Unknown or unsupported backend: {id}"
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// World setup
// ---------------------------------------------------------------------------

pub struct World {
    pub store: Arc<MemoryStore>,
    pub backend: Arc<ScriptedBackend>,
    pub controller: JobController<MemoryStore>,
    pub set_id: Id,
    pub dataset_id: Id,
    pub files: Vec<Id>,
    /// Holds the on-disk fixtures; dropping the world removes them.
    pub dir: tempfile::TempDir,
}

/// A store, a controller with a fast poll interval, and a caption set with
/// `num_files` members pointing at real files on disk.
pub fn world(num_files: usize, backend: ScriptedBackend) -> World {
    world_with_set(num_files, backend, |_| {})
}

pub fn world_with_set(
    num_files: usize,
    backend: ScriptedBackend,
    customize: impl FnOnce(&mut CaptionSet),
) -> World {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(backend);

    let set_id = Id::new_v4();
    let dataset_id = Id::new_v4();
    let mut set = CaptionSet {
        id: set_id,
        dataset_id,
        style: CaptionStyle::Natural,
        template_id: None,
        custom_prompt: None,
        trigger_phrase: None,
        max_length: None,
    };
    customize(&mut set);
    store.insert_caption_set(set);

    let dir = tempfile::tempdir().unwrap();
    let mut files = Vec::new();
    for i in 0..num_files {
        let file_id = Id::new_v4();
        let path = dir.path().join(format!("{i}.jpg"));
        // Not a decodable image: preprocessing falls back to raw bytes.
        std::fs::write(&path, b"fake image bytes").unwrap();
        store.insert_member(
            dataset_id,
            DatasetMember {
                file_id,
                order_index: i as i32,
            },
            path,
        );
        files.push(file_id);
    }

    let cfg = VisionConfig {
        backend: BACKEND_ID.into(),
        ..VisionConfig::default()
    };
    let registry = Arc::new(ScriptedRegistry::new(backend.clone()));
    let controller = JobController::new(store.clone(), registry, cfg)
        .with_poll_interval(Duration::from_millis(10));

    World {
        store,
        backend,
        controller,
        set_id,
        dataset_id,
        files,
        dir,
    }
}

/// A well-formed model reply in the instructed JSON schema.
pub fn json_reply(caption: &str, overall: f64) -> String {
    format!(
        r#"{{"caption": "{caption}", "caption_ru": "перевод", "quality": {{"sharpness": 0.9, "clarity": 0.8, "composition": 0.7, "exposure": 0.8, "overall": {overall}}}, "flags": ["slightly_soft"]}}"#
    )
}

/// Poll the job until `predicate` holds, panicking after two seconds.
pub async fn wait_for(store: &MemoryStore, job_id: Id, predicate: impl Fn(&Job) -> bool) -> Job {
    for _ in 0..400 {
        if let Some(job) = store.find_job(job_id).await.unwrap() {
            if predicate(&job) {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for job {job_id}");
}

pub async fn wait_for_status(store: &MemoryStore, job_id: Id, status: JobStatus) -> Job {
    wait_for(store, job_id, |job| job.status == status).await
}
