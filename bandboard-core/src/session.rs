/// One signed-in user's board session: owns the services, the view and the UI state.
///
/// start:  login snapshot, presence online, inactivity tracker wired into history
/// finish: logout snapshot, presence offline
use std::sync::Arc;

use crate::activity::ActivityTracker;
use crate::clock::Clock;
use crate::config::BoardConfig;
use crate::lock::{AdvisoryLockManager, LockError, NoteInteraction};
use crate::mutation::BoardService;
use crate::presence::PresenceTracker;
use crate::snapshot::{SnapshotReason, SnapshotService};
use crate::store::{RemoteStore, StoreError, StoreEvent};
use crate::types::UserIdentity;
use crate::ui_state::UiState;
use crate::view::BoardView;

pub struct BoardSession {
    user: UserIdentity,
    config: BoardConfig,
    store: Arc<dyn RemoteStore>,
    service: BoardService,
    snapshots: Arc<SnapshotService>,
    presence: PresenceTracker,
    view: BoardView,
    ui: UiState,
    activity: Option<ActivityTracker>,
}

impl BoardSession {
    pub fn start(
        store: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        user: UserIdentity,
        config: BoardConfig,
    ) -> Result<Self, StoreError> {
        let locks = Arc::new(AdvisoryLockManager::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.lock_ttl_ms,
        ));
        let mut service = BoardService::new(Arc::clone(&store), locks, config.clone());
        let snapshots = Arc::new(SnapshotService::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.snapshot_limit,
        ));
        let presence = PresenceTracker::new(Arc::clone(&store), clock);

        save_quietly(&snapshots, SnapshotReason::Login, &user);
        presence.go_online(&user);

        let activity = if tokio::runtime::Handle::try_current().is_ok() {
            let idle_snapshots = Arc::clone(&snapshots);
            let idle_user = user.clone();
            let tracker = ActivityTracker::spawn(config.inactivity_snapshot_delay(), move || {
                save_quietly(&idle_snapshots, SnapshotReason::Inactivity, &idle_user);
            });
            service.set_activity(tracker.signal());
            Some(tracker)
        } else {
            log::debug!("[bandboard.session] No runtime, inactivity snapshots disabled");
            None
        };

        let mut view = BoardView::new();
        view.refresh(store.as_ref())?;
        log::info!("[bandboard.session] {} joined the board", user.name);

        Ok(Self {
            user,
            config,
            store,
            service,
            snapshots,
            presence,
            view,
            ui: UiState::new(),
            activity,
        })
    }

    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn service(&self) -> &BoardService {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut BoardService {
        &mut self.service
    }

    /// Mutation service and UI state together, for the drop handlers.
    pub fn service_and_ui(&mut self) -> (&mut BoardService, &mut UiState) {
        (&mut self.service, &mut self.ui)
    }

    pub fn snapshots(&self) -> &SnapshotService {
        &self.snapshots
    }

    pub fn view(&self) -> &BoardView {
        &self.view
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut UiState {
        &mut self.ui
    }

    pub fn refresh_view(&mut self) -> Result<(), StoreError> {
        self.view.refresh(self.store.as_ref())
    }

    pub fn apply_event(&mut self, event: &StoreEvent) -> Result<bool, StoreError> {
        self.view.apply(self.store.as_ref(), event)
    }

    /// Lock `note_id` for a drag or edit by this user.
    pub fn begin_interaction(&self, note_id: &str) -> Result<NoteInteraction, LockError> {
        NoteInteraction::begin(
            Arc::clone(self.service.locks()),
            note_id,
            &self.user,
            self.config.lock_renew_interval(),
        )
    }

    pub fn is_locked_by_other(&self, note_id: &str) -> bool {
        self.service.locks().is_locked_by_other(note_id, &self.user.id)
    }

    pub fn heartbeat(&self) {
        self.presence.heartbeat(&self.user.id);
    }

    pub fn finish(mut self) {
        drop(self.activity.take());
        save_quietly(&self.snapshots, SnapshotReason::Logout, &self.user);
        self.presence.go_offline(&self.user.id);
        log::info!("[bandboard.session] {} left the board", self.user.name);
    }
}

fn save_quietly(snapshots: &SnapshotService, reason: SnapshotReason, user: &UserIdentity) {
    if let Err(e) = snapshots.capture(&reason, user) {
        log::warn!("[bandboard.session] {:?} snapshot failed: {}", reason, e);
    }
}
