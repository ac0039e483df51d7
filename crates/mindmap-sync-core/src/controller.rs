use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::boundary::{CommitBackend, DocumentSyncBoundary, UserNotifier};
use crate::error::SyncError;
use crate::snapshot::DocumentSnapshot;
use crate::status::{SaveStatus, SaveView};

const NOT_READY_NOTICE: &str = "Mind map component has not finished loading.";
const DECLINED_NOTICE: &str = "Save failed, please retry.";
const REJECTED_NOTICE: &str = "An unknown error occurred while saving.";

const SAVING_MESSAGE: &str = "Saving...";
const SYNCHRONIZING_MESSAGE: &str = "Saved. Synchronizing latest data...";
const SUCCESS_MESSAGE: &str = "Sync complete. Document is now read-only.";
const DECLINED_MESSAGE: &str = "Save failed!";
const REJECTED_MESSAGE: &str = "Save error!";

/// Drives the save workflow: capture, commit, reconcile, lock.
///
/// On a successful commit the document's live state is replaced with the
/// backend's authoritative snapshot and the document becomes read-only. On
/// failure the document is left exactly as it was. At most one save runs at
/// a time; a trigger while one is in flight is rejected with
/// [`SyncError::SaveInProgress`].
///
/// Edits made to the document between capture and commit completion are
/// overwritten by the authoritative snapshot.
pub struct SaveController {
    document: RwLock<Option<Arc<dyn DocumentSyncBoundary>>>,
    backend: Arc<dyn CommitBackend>,
    notifier: Arc<dyn UserNotifier>,
    in_flight: AtomicBool,
    view: watch::Sender<SaveView>,
}

impl std::fmt::Debug for SaveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveController")
            .field("backend", &self.backend.backend_name())
            .field("attached", &self.is_attached())
            .field("view", &*self.view.borrow())
            .finish_non_exhaustive()
    }
}

/// Clears the in-flight flag when a save ends, including when its future is dropped.
///
/// A save abandoned mid-flight counts as a rejected commit and is reported to the user.
struct InFlight<'a> {
    controller: &'a SaveController,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut abandoned = false;
        self.controller.view.send_if_modified(|view| {
            let mut modified = false;
            if view.status.is_in_flight() {
                view.status = SaveStatus::Failed;
                view.message = REJECTED_MESSAGE.to_string();
                abandoned = true;
                modified = true;
            }
            if view.busy {
                view.busy = false;
                modified = true;
            }
            if modified {
                view.changed_at = Utc::now();
            }
            modified
        });
        if abandoned {
            warn!("Save abandoned before the commit completed");
            self.controller.notifier.notify(REJECTED_NOTICE);
        }
        self.controller.in_flight.store(false, Ordering::Release);
    }
}

impl SaveController {
    pub fn new(backend: Arc<dyn CommitBackend>, notifier: Arc<dyn UserNotifier>) -> Self {
        Self {
            document: RwLock::new(None),
            backend,
            notifier,
            in_flight: AtomicBool::new(false),
            view: watch::Sender::new(SaveView::default()),
        }
    }

    /// Attach the document component the controller saves.
    pub fn attach(&self, document: Arc<dyn DocumentSyncBoundary>) {
        *self.document.write().unwrap_or_else(PoisonError::into_inner) = Some(document);
        debug!("Document component attached");
    }

    /// Detach the document component. Later saves fail with `NotReady`.
    pub fn detach(&self) -> Option<Arc<dyn DocumentSyncBoundary>> {
        let previous = self
            .document
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!("Document component detached");
        previous
    }

    pub fn is_attached(&self) -> bool {
        self.document
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn status(&self) -> SaveStatus {
        self.view.borrow().status
    }

    pub fn view(&self) -> SaveView {
        self.view.borrow().clone()
    }

    /// Watch status, busy flag and message changes.
    pub fn subscribe(&self) -> watch::Receiver<SaveView> {
        self.view.subscribe()
    }

    /// Post a status line outside a save, e.g. when the document is unlocked.
    ///
    /// Status and busy flag are unchanged. Ignored while a save is in flight.
    pub fn set_message(&self, message: &str) {
        if self.in_flight.load(Ordering::Acquire) {
            return;
        }
        self.view.send_if_modified(|view| {
            if view.status.is_in_flight() || view.message == message {
                return false;
            }
            view.message = message.to_string();
            view.changed_at = Utc::now();
            true
        });
    }

    /// Return a settled controller to `Idle`. Does nothing while a save is in flight.
    pub fn reset(&self) {
        if self.in_flight.load(Ordering::Acquire) {
            return;
        }
        self.view.send_if_modified(|view| {
            if !view.status.is_settled() {
                return false;
            }
            *view = SaveView::default();
            true
        });
    }

    /// Save the attached document and reconcile it with the backend's answer.
    ///
    /// Returns the authoritative snapshot now held by the document.
    #[instrument(skip(self), level = "debug", fields(backend = self.backend.backend_name()))]
    pub async fn trigger_save(&self) -> Result<DocumentSnapshot, SyncError> {
        let Some(document) = self.ready_document() else {
            warn!("Save triggered before the document component was ready");
            self.notifier.notify(NOT_READY_NOTICE);
            return Err(SyncError::NotReady);
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Save already in progress, ignoring trigger");
            return Err(SyncError::SaveInProgress);
        }
        let _in_flight = InFlight { controller: self };

        self.publish(SaveStatus::Saving, true, SAVING_MESSAGE);

        let captured = document.capture();
        info!(
            nodes = captured.node_count(),
            fingerprint = %captured.fingerprint(),
            "Captured document snapshot"
        );

        let authoritative = match self.commit(captured).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let (notice, message) = match e {
                    SyncError::CommitDeclined(_) => (DECLINED_NOTICE, DECLINED_MESSAGE),
                    _ => (REJECTED_NOTICE, REJECTED_MESSAGE),
                };
                warn!("Save failed: {}", e);
                self.notifier.notify(notice);
                self.publish(SaveStatus::Failed, false, message);
                return Err(e);
            }
        };

        self.publish(SaveStatus::Synchronizing, true, SYNCHRONIZING_MESSAGE);
        document.replace(authoritative.clone());
        document.set_editable(false);
        self.publish(SaveStatus::Success, false, SUCCESS_MESSAGE);

        info!(
            nodes = authoritative.node_count(),
            fingerprint = %authoritative.fingerprint(),
            "Document synchronized with authoritative snapshot"
        );
        Ok(authoritative)
    }

    fn ready_document(&self) -> Option<Arc<dyn DocumentSyncBoundary>> {
        self.document
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|d| d.is_ready())
            .cloned()
    }

    /// Run the commit and classify its outcome.
    async fn commit(&self, snapshot: DocumentSnapshot) -> Result<DocumentSnapshot, SyncError> {
        let response = self.backend.commit(snapshot).await.map_err(|e| match e {
            e if e.is_commit_failure() => e,
            other => SyncError::CommitRejected(other.to_string()),
        })?;

        let authoritative = response.into_authoritative()?;
        authoritative.validate().map_err(|e| {
            SyncError::CommitDeclined(format!("backend returned an unusable snapshot: {}", e))
        })?;
        Ok(authoritative)
    }

    fn publish(&self, status: SaveStatus, busy: bool, message: &str) {
        debug!("Save status -> {}", status);
        self.view.send_replace(SaveView {
            status,
            busy,
            message: message.to_string(),
            changed_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::snapshot::{CommitResponse, NodeType, RawNode};

    type EventLog = Arc<Mutex<Vec<String>>>;

    struct FakeDocument {
        state: Mutex<DocumentSnapshot>,
        editable: AtomicBool,
        ready: bool,
        log: EventLog,
    }

    impl FakeDocument {
        fn new(initial: DocumentSnapshot, log: EventLog) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(initial),
                editable: AtomicBool::new(true),
                ready: true,
                log,
            })
        }

        fn live(&self) -> DocumentSnapshot {
            self.state.lock().unwrap().clone()
        }

        fn rename(&self, id: &str, name: &str) {
            self.state.lock().unwrap().find_mut(id).unwrap().name = name.to_string();
        }
    }

    impl DocumentSyncBoundary for FakeDocument {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn capture(&self) -> DocumentSnapshot {
            self.log.lock().unwrap().push("capture".to_string());
            self.live()
        }

        fn replace(&self, snapshot: DocumentSnapshot) {
            self.log.lock().unwrap().push("replace".to_string());
            *self.state.lock().unwrap() = snapshot;
        }

        fn set_editable(&self, editable: bool) {
            self.log
                .lock()
                .unwrap()
                .push(format!("set_editable:{}", editable));
            self.editable.store(editable, Ordering::SeqCst);
        }

        fn is_editable(&self) -> bool {
            self.editable.load(Ordering::SeqCst)
        }
    }

    enum Behavior {
        /// Reply with this snapshot
        Accept(DocumentSnapshot),
        /// Suffix the root name and append a node, like the demo backend
        Transform,
        Decline,
        Reject,
        /// Reject the first call, transform on later ones
        RejectFirst,
    }

    struct ScriptedBackend {
        behavior: Behavior,
        delay: Duration,
        calls: AtomicUsize,
        received: Mutex<Vec<DocumentSnapshot>>,
        log: EventLog,
    }

    impl ScriptedBackend {
        fn new(behavior: Behavior, log: EventLog) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                delay: Duration::from_secs(1),
                calls: AtomicUsize::new(0),
                received: Mutex::new(Vec::new()),
                log,
            })
        }
    }

    #[async_trait]
    impl CommitBackend for ScriptedBackend {
        fn backend_name(&self) -> &'static str {
            "scripted"
        }

        async fn commit(&self, snapshot: DocumentSnapshot) -> Result<CommitResponse, SyncError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push("commit".to_string());
            self.received.lock().unwrap().push(snapshot.clone());
            tokio::time::sleep(self.delay).await;

            match &self.behavior {
                Behavior::Accept(data) => Ok(CommitResponse::accepted(data.clone())),
                Behavior::RejectFirst if call == 0 => {
                    Err(SyncError::Io("network unreachable".to_string()))
                }
                Behavior::Transform | Behavior::RejectFirst => {
                    let mut data = snapshot;
                    data.name = format!("{} (已保存)", data.name);
                    data.child_node_list.push(
                        RawNode::new("server-id-1", "✨ 后端添加的节点")
                            .with_type(NodeType::ModuleNode),
                    );
                    Ok(CommitResponse::accepted(data))
                }
                Behavior::Decline => Ok(CommitResponse::declined()),
                Behavior::Reject => Err(SyncError::Io("network unreachable".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl UserNotifier for RecordingNotifier {
        fn notify(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    struct Harness {
        controller: SaveController,
        document: Arc<FakeDocument>,
        backend: Arc<ScriptedBackend>,
        notifier: Arc<RecordingNotifier>,
        log: EventLog,
    }

    fn harness(initial: DocumentSnapshot, behavior: Behavior) -> Harness {
        let log: EventLog = Arc::default();
        let document = FakeDocument::new(initial, log.clone());
        let backend = ScriptedBackend::new(behavior, log.clone());
        let notifier = Arc::new(RecordingNotifier::default());
        let controller = SaveController::new(backend.clone(), notifier.clone());
        controller.attach(document.clone());
        Harness {
            controller,
            document,
            backend,
            notifier,
            log,
        }
    }

    fn empty_root() -> DocumentSnapshot {
        RawNode::new("root", "Root")
    }

    fn server_data() -> DocumentSnapshot {
        RawNode::new("root", "Root (已保存)").with_child(
            RawNode::new("server-id-1", "✨ 后端添加的节点")
                .with_type(NodeType::ModuleNode),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_replaces_and_locks() {
        let h = harness(empty_root(), Behavior::Accept(server_data()));

        let applied = h.controller.trigger_save().await.unwrap();

        assert_eq!(applied, server_data());
        assert_eq!(h.document.live(), server_data());
        assert!(!h.document.is_editable());
        assert_eq!(h.controller.status(), SaveStatus::Success);
        assert!(!h.controller.view().busy);
        assert!(h.notifier.messages.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_with_transformed_snapshot() {
        let h = harness(empty_root(), Behavior::Transform);

        h.controller.trigger_save().await.unwrap();

        let live = h.document.live();
        assert_eq!(live, server_data());
        assert_eq!(h.backend.received.lock().unwrap()[0], empty_root());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_order() {
        let h = harness(empty_root(), Behavior::Transform);

        h.controller.trigger_save().await.unwrap();

        let log = h.log.lock().unwrap().clone();
        assert_eq!(log, vec!["capture", "commit", "replace", "set_editable:false"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_commit_leaves_document_untouched() {
        let h = harness(empty_root(), Behavior::Reject);

        let err = h.controller.trigger_save().await.unwrap_err();

        assert!(matches!(err, SyncError::CommitRejected(ref m) if m.contains("network")));
        assert_eq!(h.document.live(), empty_root());
        assert!(h.document.is_editable());
        assert_eq!(h.controller.status(), SaveStatus::Failed);
        assert_eq!(h.controller.view().message, REJECTED_MESSAGE);
        assert!(!h.controller.view().busy);
        assert_eq!(*h.notifier.messages.lock().unwrap(), vec![REJECTED_NOTICE]);
        assert_eq!(*h.log.lock().unwrap(), vec!["capture", "commit"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_commit_leaves_document_untouched() {
        let h = harness(empty_root(), Behavior::Decline);
        h.document.set_editable(false);

        let err = h.controller.trigger_save().await.unwrap_err();

        assert!(matches!(err, SyncError::CommitDeclined(_)));
        assert_eq!(h.document.live(), empty_root());
        assert!(!h.document.is_editable());
        assert_eq!(h.controller.status(), SaveStatus::Failed);
        assert_eq!(h.controller.view().message, DECLINED_MESSAGE);
        assert_eq!(*h.notifier.messages.lock().unwrap(), vec![DECLINED_NOTICE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_authoritative_snapshot_is_declined() {
        let broken = RawNode::new("root", "Root")
            .with_child(RawNode::new("dup", "A"))
            .with_child(RawNode::new("dup", "B"));
        let h = harness(empty_root(), Behavior::Accept(broken));

        let err = h.controller.trigger_save().await.unwrap_err();

        assert!(matches!(err, SyncError::CommitDeclined(ref m) if m.contains("dup")));
        assert_eq!(h.document.live(), empty_root());
        assert!(h.document.is_editable());
    }

    #[tokio::test]
    async fn test_not_attached_is_not_ready() {
        let log: EventLog = Arc::default();
        let backend = ScriptedBackend::new(Behavior::Transform, log);
        let notifier = Arc::new(RecordingNotifier::default());
        let controller = SaveController::new(backend.clone(), notifier.clone());

        let err = controller.trigger_save().await.unwrap_err();

        assert_eq!(err, SyncError::NotReady);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.status(), SaveStatus::Idle);
        assert_eq!(*notifier.messages.lock().unwrap(), vec![NOT_READY_NOTICE]);
    }

    #[tokio::test]
    async fn test_unready_component_is_not_ready() {
        let log: EventLog = Arc::default();
        let document = Arc::new(FakeDocument {
            state: Mutex::new(empty_root()),
            editable: AtomicBool::new(true),
            ready: false,
            log: log.clone(),
        });
        let backend = ScriptedBackend::new(Behavior::Transform, log.clone());
        let controller =
            SaveController::new(backend.clone(), Arc::new(RecordingNotifier::default()));
        controller.attach(document);

        assert_eq!(controller.trigger_save().await, Err(SyncError::NotReady));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_makes_controller_not_ready() {
        let h = harness(empty_root(), Behavior::Transform);
        assert!(h.controller.is_attached());

        assert!(h.controller.detach().is_some());

        assert!(!h.controller.is_attached());
        assert_eq!(h.controller.trigger_save().await, Err(SyncError::NotReady));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_trigger_is_rejected() {
        let h = harness(empty_root(), Behavior::Transform);

        let (first, second) =
            futures::join!(h.controller.trigger_save(), h.controller.trigger_save());

        assert!(first.is_ok());
        assert_eq!(second, Err(SyncError::SaveInProgress));
        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 1);
        let replaces = h
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == "replace")
            .count();
        assert_eq!(replaces, 1);
        assert_eq!(h.controller.status(), SaveStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_while_commit_pending() {
        let h = harness(empty_root(), Behavior::Transform);
        let mut rx = h.controller.subscribe();

        let (result, observed) = futures::join!(h.controller.trigger_save(), async {
            rx.wait_for(|v| v.status == SaveStatus::Saving)
                .await
                .unwrap()
                .clone()
        });

        result.unwrap();
        assert!(observed.busy);
        assert_eq!(observed.message, SAVING_MESSAGE);
        assert_eq!(observed.button_label(), "Saving...");
        assert_eq!(rx.borrow().status, SaveStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_during_commit_are_overwritten() {
        let h = harness(empty_root(), Behavior::Transform);

        let (result, _) = futures::join!(h.controller.trigger_save(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            h.document.rename("root", "Typed while saving");
        });

        result.unwrap();
        // the captured snapshot did not see the later edit
        assert_eq!(h.backend.received.lock().unwrap()[0].name, "Root");
        assert_eq!(h.document.live().name, "Root (已保存)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_failure() {
        let h = harness(empty_root(), Behavior::RejectFirst);

        assert!(h.controller.trigger_save().await.is_err());
        assert_eq!(h.controller.status(), SaveStatus::Failed);
        assert_eq!(h.document.live(), empty_root());
        assert!(h.document.is_editable());

        let mut rx = h.controller.subscribe();
        let (result, observed) = futures::join!(h.controller.trigger_save(), async {
            rx.wait_for(|v| v.status == SaveStatus::Saving)
                .await
                .unwrap()
                .busy
        });

        result.unwrap();
        assert!(observed);
        assert_eq!(h.controller.status(), SaveStatus::Success);
        assert_eq!(h.document.live(), server_data());
        assert!(!h.document.is_editable());
        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*h.notifier.messages.lock().unwrap(), vec![REJECTED_NOTICE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_save_from_failed_state() {
        let h = harness(empty_root(), Behavior::Decline);

        assert!(h.controller.trigger_save().await.is_err());
        assert!(h.controller.trigger_save().await.is_err());

        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.notifier.messages.lock().unwrap().len(), 2);
        assert_eq!(h.controller.status(), SaveStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_returns_to_idle() {
        let h = harness(empty_root(), Behavior::Transform);
        h.controller.reset();
        assert_eq!(h.controller.status(), SaveStatus::Idle);

        h.controller.trigger_save().await.unwrap();
        h.controller.reset();

        let view = h.controller.view();
        assert_eq!(view.status, SaveStatus::Idle);
        assert!(!view.busy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_save_does_not_leak_saving() {
        let h = harness(empty_root(), Behavior::Transform);

        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), h.controller.trigger_save()).await;

        assert!(timed_out.is_err());
        assert_eq!(h.controller.status(), SaveStatus::Failed);
        assert_eq!(h.controller.view().message, REJECTED_MESSAGE);
        assert!(!h.controller.view().busy);
        assert_eq!(h.document.live(), empty_root());
        assert_eq!(*h.notifier.messages.lock().unwrap(), vec![REJECTED_NOTICE]);

        // the in-flight slot is free again
        h.controller.trigger_save().await.unwrap();
        assert_eq!(h.controller.status(), SaveStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_message_outside_save() {
        let h = harness(empty_root(), Behavior::Transform);

        h.controller.set_message("You can edit now.");
        let view = h.controller.view();
        assert_eq!(view.status, SaveStatus::Idle);
        assert!(!view.busy);
        assert_eq!(view.message, "You can edit now.");

        let mut rx = h.controller.subscribe();
        let (result, _) = futures::join!(h.controller.trigger_save(), async {
            rx.wait_for(|v| v.status == SaveStatus::Saving).await.unwrap();
            h.controller.set_message("ignored");
        });

        result.unwrap();
        assert_eq!(h.controller.status(), SaveStatus::Success);
        assert_eq!(h.controller.view().message, SUCCESS_MESSAGE);
    }
}
