use super::{
    format_clock, HookToken, InstanceKey, SubscriptionId, TimerContext, TimerPhase,
    TimerSnapshot, TimerUpdate, TimerView,
};
use crate::error::AppError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// One mounted timer view. Dropping the last handle stops ticking; `unmount` additionally
/// preserves a snapshot for the next mount of the same [`InstanceKey`].
#[derive(Clone)]
pub struct TimerController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    ctx: TimerContext,
    key: InstanceKey,
    view: Arc<dyn TimerView>,
    state: Mutex<LocalState>,
}

struct LocalState {
    phase: TimerPhase,
    seconds: u64,
    /// Last value pushed by a periodic flush or a pause
    last_reported: u64,
    ticker: Option<JoinHandle<()>>,
    flusher: Option<JoinHandle<()>>,
    backend_check: Option<JoinHandle<()>>,
    subscription: Option<SubscriptionId>,
    unload_token: Option<HookToken>,
}

impl LocalState {
    fn new() -> Self {
        Self {
            phase: TimerPhase::Uninitialized,
            seconds: 0,
            last_reported: 0,
            ticker: None,
            flusher: None,
            backend_check: None,
            subscription: None,
            unload_token: None,
        }
    }

    fn stop_intervals(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
        if let Some(handle) = self.flusher.take() {
            handle.abort();
        }
    }
}

impl TimerController {
    pub(crate) fn mount(
        ctx: TimerContext,
        key: InstanceKey,
        initial_seconds: u64,
        view: Arc<dyn TimerView>,
    ) -> Self {
        let mount_count = ctx.slots.record_mount(&key);
        let task_id = key.task_id.clone();
        let inner = Arc::new(ControllerInner {
            ctx: ctx.clone(),
            key: key.clone(),
            view,
            state: Mutex::new(LocalState::new()),
        });

        let (seconds, was_active) = match ctx.slots.take(&key) {
            Some(snapshot) => {
                inner.set_phase(TimerPhase::Restoring);
                ctx.registry.register(&task_id, 0);
                // the task may have kept running unobserved since the snapshot was taken
                let tracked = ctx.registry.reconcile_missed_time(&task_id);
                let restored = TimerSnapshot {
                    is_active: snapshot.is_active,
                    elapsed_seconds: snapshot.elapsed_seconds.max(tracked),
                };
                ctx.registry.restore(&task_id, restored);
                info!(
                    "[TIMER] {} restored from snapshot: active={}, time={}s",
                    key, restored.is_active, restored.elapsed_seconds
                );
                (restored.elapsed_seconds, restored.is_active)
            }
            None => {
                inner.set_phase(TimerPhase::Initializing);
                ctx.registry.register(&task_id, initial_seconds);
                let tracked = ctx.registry.reconcile_missed_time(&task_id);
                let seconds = initial_seconds.max(tracked);
                let active = ctx.registry.is_running(&task_id);
                info!(
                    "[TIMER] {} initialized: active={}, time={}s (mount #{})",
                    key, active, seconds, mount_count
                );
                (seconds, active)
            }
        };

        {
            let mut state = inner.lock();
            state.seconds = seconds;
            state.last_reported = seconds;
            state.phase = TimerPhase::Idle;
        }

        let weak = Arc::downgrade(&inner);
        let subscription = ctx.registry.subscribe(
            &task_id,
            Arc::new(move |value| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_forced_update(value);
                }
            }),
        );
        inner.lock().subscription = subscription;

        let weak = Arc::downgrade(&inner);
        let unload_token = ctx.unload.register(
            key.clone(),
            Arc::new(move || {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.flush_on_close().await;
                    }
                })
            }),
        );
        inner.lock().unload_token = Some(unload_token);

        if was_active {
            // a timer left running keeps running across the remount
            inner.enter_running();
        } else if mount_count == 1 {
            let handle = inner.spawn_backend_check();
            inner.lock().backend_check = Some(handle);
        }

        inner.render();
        Self { inner }
    }

    pub fn key(&self) -> &InstanceKey {
        &self.inner.key
    }

    pub fn seconds(&self) -> u64 {
        self.inner.lock().seconds
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().phase == TimerPhase::Running
    }

    pub fn phase(&self) -> TimerPhase {
        self.inner.lock().phase
    }

    /// `HH:MM:SS` rendering of the current value.
    pub fn clock(&self) -> String {
        format_clock(self.seconds())
    }

    pub fn update(&self) -> TimerUpdate {
        self.inner.update()
    }

    /// Idle → Running. The local transition sticks even if the remote write fails.
    pub async fn start(&self) -> Result<(), AppError> {
        if !self.inner.enter_running() {
            return Ok(());
        }
        self.inner.render();
        let seconds = self.seconds();
        let task_id = &self.inner.key.task_id;
        self.inner
            .ctx
            .coordinator
            .update_timer(task_id, seconds, true)
            .await
            .map_err(|e| {
                error!("[TIMER] {} failed to activate timer remotely: {}", self.inner.key, e);
                e
            })?;
        info!("[TIMER] {} activated at {}s", self.inner.key, seconds);
        Ok(())
    }

    /// Running → Idle with an immediate flush of `{seconds, false}`.
    pub async fn pause(&self) -> Result<(), AppError> {
        let seconds = {
            let mut state = self.inner.lock();
            if state.phase != TimerPhase::Running {
                return Ok(());
            }
            state.stop_intervals();
            state.phase = TimerPhase::Idle;
            state.last_reported = state.seconds;
            state.seconds
        };
        let task_id = &self.inner.key.task_id;
        self.inner.ctx.registry.stop(task_id);
        self.inner.render();
        info!("[TIMER] {} paused at {}s", self.inner.key, seconds);

        let coordinator = &self.inner.ctx.coordinator;
        if let Err(e) = coordinator.update_time(task_id, seconds).await {
            warn!("[TIMER] {} time save on pause failed: {}", self.inner.key, e);
        }
        coordinator
            .update_timer(task_id, seconds, false)
            .await
            .map_err(|e| {
                error!("[TIMER] {} failed to save paused state: {}", self.inner.key, e);
                e
            })
    }

    pub async fn toggle(&self) -> Result<(), AppError> {
        if self.is_running() {
            self.pause().await
        } else {
            self.start().await
        }
    }

    /// Force Idle with 0 here, in the registry (and so in every other instance
    /// of the task), and remotely.
    pub async fn reset(&self) -> Result<(), AppError> {
        {
            let mut state = self.inner.lock();
            state.stop_intervals();
            state.phase = TimerPhase::Idle;
            state.seconds = 0;
            state.last_reported = 0;
        }
        let task_id = &self.inner.key.task_id;
        self.inner.ctx.registry.reset(task_id);
        self.inner.render();
        info!("[TIMER] {} reset", self.inner.key);

        let coordinator = &self.inner.ctx.coordinator;
        if let Err(e) = coordinator.update_time(task_id, 0).await {
            warn!("[TIMER] {} time save on reset failed: {}", self.inner.key, e);
        }
        coordinator.update_timer(task_id, 0, false).await.map_err(|e| {
            error!("[TIMER] {} failed to save reset state: {}", self.inner.key, e);
            e
        })
    }

    /// Best-effort flush of the current value and running flag.
    pub async fn flush_on_close(&self) {
        self.inner.flush_on_close().await
    }

    /// Tear the view down. The registry keeps its running flag so the timer
    /// survives; the next mount with the same key resumes from the snapshot.
    /// An instance already replaced by a newer mount of its key leaves that
    /// mount's hook and snapshot slot alone.
    pub fn unmount(self) {
        let inner = &self.inner;
        let task_id = &inner.key.task_id;
        let (seconds, unload_token) = {
            let mut state = inner.lock();
            state.stop_intervals();
            if let Some(handle) = state.backend_check.take() {
                handle.abort();
            }
            if let Some(subscription) = state.subscription.take() {
                inner.ctx.registry.unsubscribe(task_id, subscription);
            }
            state.phase = TimerPhase::Suspended;
            (state.seconds, state.unload_token.take())
        };
        let owns_key = unload_token
            .map_or(false, |token| inner.ctx.unload.unregister(&inner.key, token));

        if owns_key {
            let mut snapshot = inner.ctx.registry.snapshot(task_id);
            snapshot.elapsed_seconds = snapshot.elapsed_seconds.max(seconds);
            inner.ctx.slots.preserve(&inner.key, snapshot);
            info!(
                "[TIMER] {} unmounted, preserved active={}, time={}s",
                inner.key, snapshot.is_active, snapshot.elapsed_seconds
            );
        } else {
            warn!("[TIMER] {} unmounted after being replaced, snapshot skipped", inner.key);
        }

        let coordinator = inner.ctx.coordinator.clone();
        let task_id = task_id.clone();
        let key = inner.key.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.update_time(&task_id, seconds).await {
                warn!("[TIMER] {} final flush failed: {}", key, e);
            }
        });
    }
}

impl ControllerInner {
    fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: TimerPhase) {
        self.lock().phase = phase;
    }

    fn update(&self) -> TimerUpdate {
        let (seconds, running) = {
            let state = self.lock();
            (state.seconds, state.phase == TimerPhase::Running)
        };
        TimerUpdate {
            task_id: self.key.task_id.clone(),
            session: self.key.session.clone(),
            seconds,
            running,
            clock: format_clock(seconds),
        }
    }

    /// Called without the state lock held.
    fn render(&self) {
        let update = self.update();
        self.view.render(&update);
    }

    /// Start both intervals; returns false when already running.
    fn enter_running(self: &Arc<Self>) -> bool {
        {
            let mut state = self.lock();
            if state.phase == TimerPhase::Running {
                return false;
            }
            state.stop_intervals();
            state.phase = TimerPhase::Running;
            state.ticker = Some(self.spawn_ticker());
            state.flusher = Some(self.spawn_flusher());
        }
        self.ctx.registry.start(&self.key.task_id);
        true
    }

    fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.ctx.config.tick;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.on_tick();
            }
        })
    }

    fn spawn_flusher(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.ctx.config.flush_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !periodic_flush(&weak).await {
                    break;
                }
            }
        })
    }

    fn on_tick(&self) {
        let seconds = {
            let mut state = self.lock();
            if state.phase != TimerPhase::Running {
                return;
            }
            state.seconds += 1;
            state.seconds
        };
        self.ctx.registry.update_time(&self.key.task_id, seconds);
        self.render();
    }

    /// Registry reset, possibly from another instance of the same task.
    fn on_forced_update(&self, value: u64) {
        {
            let mut state = self.lock();
            state.stop_intervals();
            state.phase = TimerPhase::Idle;
            state.seconds = value;
            state.last_reported = value;
        }
        debug!("[TIMER] {} forced to {}s", self.key, value);
        self.render();
    }

    /// First mount only: trust the backend's persisted running flag over a
    /// missing local record.
    fn spawn_backend_check(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let coordinator = self.ctx.coordinator.clone();
        let task_id = self.key.task_id.clone();
        let key = self.key.clone();
        tokio::spawn(async move {
            match coordinator.fetch_task(&task_id).await {
                Ok(task) if task.timer_active => {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if inner.lock().phase != TimerPhase::Idle {
                        return;
                    }
                    info!(
                        "[TIMER] {} active on backend but idle locally, resuming",
                        key
                    );
                    if inner.enter_running() {
                        inner.render();
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("[TIMER] {} backend state check failed: {}", key, e);
                }
            }
        })
    }

    async fn flush_on_close(&self) {
        let (seconds, running) = {
            let state = self.lock();
            (state.seconds, state.phase == TimerPhase::Running)
        };
        info!(
            "[TIMER] {} closing, saving time={}s, active={}",
            self.key, seconds, running
        );
        if let Err(e) = self
            .ctx
            .coordinator
            .update_timer(&self.key.task_id, seconds, running)
            .await
        {
            error!("[TIMER] {} failed to save state on close: {}", self.key, e);
        }
    }
}

/// One firing of the persistence interval. Returns false once the instance is gone.
async fn periodic_flush(weak: &Weak<ControllerInner>) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    let seconds = {
        let mut state = inner.lock();
        if state.phase != TimerPhase::Running || state.seconds <= state.last_reported {
            return true;
        }
        state.last_reported = state.seconds;
        state.seconds
    };
    let coordinator = inner.ctx.coordinator.clone();
    let task_id = inner.key.task_id.clone();
    let key = inner.key.clone();
    drop(inner);

    debug!("[TIMER] {} auto-saving time={}s", key, seconds);
    if let Err(e) = coordinator.update_time(&task_id, seconds).await {
        warn!("[TIMER] {} auto-save failed: {}", key, e);
    }
    if let Err(e) = coordinator.update_timer(&task_id, seconds, true).await {
        error!("[TIMER] {} failed to keep timer active remotely: {}", key, e);
    }
    true
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.stop_intervals();
        if let Some(handle) = state.backend_check.take() {
            handle.abort();
        }
    }
}
