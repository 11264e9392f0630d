#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use signoff_core::audit::InMemoryAuditSink;
use signoff_core::clock::ManualClock;
use signoff_core::domain::approval::{
    ApprovalCode, ApprovalId, ApprovalRecord, NewApproval, UserSnapshot,
};
use signoff_core::errors::ApprovalError;
use signoff_db::kv::{InMemoryKeyValueStore, KeyValueStore, KvError};
use signoff_db::repositories::{ApprovalRepository, ApprovalStore, RecordListing};
use signoff_service::notify::{Notification, NotificationEvent, Notifier, NotifyError};
use signoff_service::service::ApprovalService;

pub const T0: i64 = 1_700_000_000_000;

pub fn request(requester: &str, approver: &str, description: &str) -> NewApproval {
    NewApproval {
        requester: UserSnapshot::new(requester, requester.trim_start_matches("u-"), requester),
        approver: UserSnapshot::new(approver, approver.trim_start_matches("u-"), approver),
        description: description.to_string(),
        channel_id: "ch-ops".to_string(),
        team_id: "team-core".to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Notify { event: NotificationEvent, recipient: String, code: ApprovalCode },
    Edit { post_id: String, event: NotificationEvent },
}

/// Notifier that remembers every call and can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    fail_all: AtomicBool,
    posts: AtomicUsize,
}

impl RecordingNotifier {
    pub fn fail_everything(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("lock").clone()
    }

    pub fn clear(&self) {
        self.sent.lock().expect("lock").clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<Option<String>, NotifyError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected {
                status: 400,
                body: "cannot_dm_user: direct messages disabled".to_string(),
            });
        }
        self.sent.lock().expect("lock").push(Sent::Notify {
            event: notification.event,
            recipient: notification.recipient_id.clone(),
            code: notification.code.clone(),
        });
        let post = self.posts.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("post-{post}")))
    }

    async fn edit(&self, post_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("connection reset".to_string()));
        }
        self.sent
            .lock()
            .expect("lock")
            .push(Sent::Edit { post_id: post_id.to_string(), event: notification.event });
        Ok(())
    }
}

/// In-memory key/value store that can fail a number of upcoming writes.
#[derive(Default)]
pub struct FlakyKv {
    inner: InMemoryKeyValueStore,
    failing_sets: AtomicUsize,
    failing_prefix: Mutex<String>,
}

impl FlakyKv {
    pub fn fail_next_sets(&self, count: usize, prefix: &str) {
        *self.failing_prefix.lock().expect("lock") = prefix.to_string();
        self.failing_sets.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for FlakyKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        let matches = key.starts_with(self.failing_prefix.lock().expect("lock").as_str());
        if matches
            && self
                .failing_sets
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
        {
            return Err(KvError::Unavailable("database is locked".to_string()));
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.inner.delete(key).await
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<String>, KvError> {
        self.inner.list(offset, limit).await
    }
}

/// Repository wrapper for situations a real store only hits under races or bugs.
pub struct ScriptedRepository {
    inner: ApprovalStore,
    panic_next_scan: AtomicBool,
    stale_scan: Mutex<Option<RecordListing>>,
    all_codes_taken: AtomicBool,
    code_lookups: AtomicUsize,
    scan_delay: Mutex<Option<Duration>>,
    scans: AtomicUsize,
}

impl ScriptedRepository {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: ApprovalStore::new(kv),
            panic_next_scan: AtomicBool::new(false),
            stale_scan: Mutex::new(None),
            all_codes_taken: AtomicBool::new(false),
            code_lookups: AtomicUsize::new(0),
            scan_delay: Mutex::new(None),
            scans: AtomicUsize::new(0),
        }
    }

    pub fn panic_on_next_scan(&self) {
        self.panic_next_scan.store(true, Ordering::SeqCst);
    }

    pub fn serve_stale_scan(&self, listing: RecordListing) {
        *self.stale_scan.lock().expect("lock") = Some(listing);
    }

    pub fn report_every_code_taken(&self) {
        self.all_codes_taken.store(true, Ordering::SeqCst);
    }

    pub fn code_lookups(&self) -> usize {
        self.code_lookups.load(Ordering::SeqCst)
    }

    /// Every approver index scan sleeps this long before reading.
    pub fn slow_scans(&self, delay: Duration) {
        *self.scan_delay.lock().expect("lock") = Some(delay);
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApprovalRepository for ScriptedRepository {
    async fn save(&self, record: &ApprovalRecord) -> Result<(), ApprovalError> {
        self.inner.save(record).await
    }

    async fn amend(&self, record: &ApprovalRecord) -> Result<(), ApprovalError> {
        self.inner.amend(record).await
    }

    async fn get_by_id(&self, id: &ApprovalId) -> Result<ApprovalRecord, ApprovalError> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_code(&self, code: &ApprovalCode) -> Result<ApprovalRecord, ApprovalError> {
        self.inner.get_by_code(code).await
    }

    async fn code_exists(&self, code: &ApprovalCode) -> Result<bool, ApprovalError> {
        self.code_lookups.fetch_add(1, Ordering::SeqCst);
        if self.all_codes_taken.load(Ordering::SeqCst) {
            return Ok(true);
        }
        self.inner.code_exists(code).await
    }

    async fn list_by_user(&self, user_id: &str) -> Result<RecordListing, ApprovalError> {
        self.inner.list_by_user(user_id).await
    }

    async fn list_approver_indexed(&self) -> Result<RecordListing, ApprovalError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let delay = *self.scan_delay.lock().expect("lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_next_scan.swap(false, Ordering::SeqCst) {
            panic!("approver index scan blew up");
        }
        if let Some(listing) = self.stale_scan.lock().expect("lock").take() {
            return Ok(listing);
        }
        self.inner.list_approver_indexed().await
    }

    async fn delete(&self, id: &ApprovalId) -> Result<(), ApprovalError> {
        self.inner.delete(id).await
    }
}

pub struct Harness {
    pub kv: Arc<FlakyKv>,
    pub repository: Arc<ScriptedRepository>,
    pub clock: Arc<ManualClock>,
    pub audit: InMemoryAuditSink,
    pub notifier: Arc<RecordingNotifier>,
    pub service: Arc<ApprovalService>,
}

impl Harness {
    pub fn new() -> Self {
        let kv = Arc::new(FlakyKv::default());
        let repository = Arc::new(ScriptedRepository::new(kv.clone()));
        let clock = Arc::new(ManualClock::at(T0));
        let audit = InMemoryAuditSink::default();
        let notifier = Arc::new(RecordingNotifier::default());
        let service = Arc::new(ApprovalService::new(
            repository.clone(),
            notifier.clone(),
            Arc::new(audit.clone()),
            clock.clone(),
        ));
        Self { kv, repository, clock, audit, notifier, service }
    }

    /// Creates a pending request through the service.
    pub async fn create(
        &self,
        requester: &str,
        approver: &str,
        description: &str,
    ) -> ApprovalRecord {
        self.service.create(request(requester, approver, description)).await.expect("create")
    }

    pub async fn stored(&self, record: &ApprovalRecord) -> ApprovalRecord {
        self.repository.get_by_id(&record.id).await.expect("stored record")
    }
}
