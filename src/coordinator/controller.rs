use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ConfigSource, RemoteConfig},
    control,
    host::{
        ElementId, EventKind, HostEvent, HostPage, ListenerId, ListenerTarget, ObserverId,
        Propagation, ReadyState,
    },
    modal::ModalController,
    placement::{PlacementDescriptor, PlacementId},
    settings::{FetchFailurePolicy, WidgetSettings},
    style,
    watcher::{self, WatchFilter},
};

use super::{AttemptGate, InjectionPhase, InjectionState, Trigger};

const ENABLE_LOGS: bool = true;

use crate::{widget_debug, widget_info, widget_warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Created(ElementId),
    /// The attempt failed; another one is scheduled after the delay.
    Rescheduled(Duration),
    /// Another attempt's fetch is in flight.
    Busy,
    Exhausted,
    /// The placement had already settled; nothing ran.
    Inert,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionSnapshot {
    pub placement_id: PlacementId,
    pub company_id: String,
    pub phase: InjectionPhase,
    pub created: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub pending_timers: usize,
    pub observing: bool,
    pub page_listeners: usize,
}

enum AfterFetch {
    Done(AttemptOutcome),
    Retry,
}

/// Drives one placement from discovery to `Created` or `Exhausted`.
///
/// Load events, fallback timers, backoff timers and DOM-change notifications
/// all end up in [`InjectionCoordinator::attempt`]. The guard is evaluated
/// under the state lock before the configuration fetch and again after it,
/// and the lock is never held across the fetch.
#[derive(Clone)]
pub struct InjectionCoordinator {
    placement: PlacementDescriptor,
    host: Arc<dyn HostPage>,
    source: Arc<dyn ConfigSource>,
    modals: ModalController,
    settings: WidgetSettings,
    state: Arc<Mutex<InjectionState>>,
    cancel: CancellationToken,
}

impl InjectionCoordinator {
    pub fn new(
        placement: PlacementDescriptor,
        host: Arc<dyn HostPage>,
        source: Arc<dyn ConfigSource>,
        modals: ModalController,
        settings: WidgetSettings,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(InjectionState::new(settings.max_attempts))),
            placement,
            host,
            source,
            modals,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn placement(&self) -> &PlacementDescriptor {
        &self.placement
    }

    /// True once every timer, observer and listener has been released.
    pub fn is_settled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the placement reaches a terminal state or is stopped.
    pub async fn settled(&self) {
        self.cancel.cancelled().await
    }

    pub async fn snapshot(&self) -> InjectionSnapshot {
        let state = self.state.lock().await;
        InjectionSnapshot {
            placement_id: self.placement.id,
            company_id: self.placement.company_id.clone(),
            phase: state.phase,
            created: state.created,
            attempts: state.attempts,
            max_attempts: state.max_attempts,
            pending_timers: state
                .resources
                .timers
                .iter()
                .chain(state.resources.debounce.iter())
                .filter(|handle| !handle.is_finished())
                .count(),
            observing: state.resources.observer.is_some(),
            page_listeners: state.resources.listeners.len(),
        }
    }

    /// The guarded entry point every trigger funnels into.
    pub async fn attempt(&self, trigger: Trigger) -> AttemptOutcome {
        if self.cancel.is_cancelled() {
            return AttemptOutcome::Inert;
        }

        let attempt = {
            let mut state = self.state.lock().await;
            match state.begin_attempt() {
                AttemptGate::Proceed(attempt) => attempt,
                AttemptGate::Busy => return AttemptOutcome::Busy,
                AttemptGate::Exhausted => {
                    self.dispose(&mut state);
                    return AttemptOutcome::Exhausted;
                }
                AttemptGate::Terminal => {
                    self.dispose(&mut state);
                    return AttemptOutcome::Inert;
                }
            }
        };
        widget_debug!(
            "placement {} attempt {}/{} via {:?}",
            self.placement.id,
            attempt,
            self.settings.max_attempts,
            trigger
        );

        if !self.host.is_attached(self.placement.anchor) {
            widget_debug!("placement {} anchor not attached yet", self.placement.id);
            return self.retry_later().await;
        }

        let fetched = self
            .source
            .fetch_config(&self.placement.company_id)
            .await;

        let next = {
            let mut state = self.state.lock().await;
            self.finish_attempt(&mut state, fetched)
        };
        match next {
            AfterFetch::Done(outcome) => outcome,
            AfterFetch::Retry => self.retry_later().await,
        }
    }

    /// Runs with the lock re-acquired after the fetch: re-checks the guard,
    /// then mounts the control.
    fn finish_attempt(
        &self,
        state: &mut InjectionState,
        fetched: Result<RemoteConfig, crate::config::FetchError>,
    ) -> AfterFetch {
        if state.is_terminal() || self.cancel.is_cancelled() {
            return AfterFetch::Done(AttemptOutcome::Inert);
        }

        let remote = match fetched {
            Ok(remote) => Some(remote),
            Err(err) => {
                widget_warn!(
                    "widget config for company {} unavailable: {}",
                    self.placement.company_id,
                    err
                );
                // An endpoint that answered, even with an error, will not
                // change its mind on retry.
                let policy = if err.is_unanswered() {
                    self.settings.fetch_failure_policy(self.placement.mode)
                } else {
                    FetchFailurePolicy::UseDefaults
                };
                match policy {
                    FetchFailurePolicy::Retry => return AfterFetch::Retry,
                    FetchFailurePolicy::UseDefaults => None,
                }
            }
        };

        if !self.host.is_attached(self.placement.anchor) {
            widget_debug!("placement {} anchor detached during fetch", self.placement.id);
            return AfterFetch::Retry;
        }

        style::ensure_styles(self.host.as_ref(), self.placement.mode);
        match control::mount_control(&self.host, &self.placement, remote.as_ref(), &self.modals) {
            Ok(control) => {
                state.mark_created(control);
                self.dispose(state);
                widget_info!(
                    "placement {} created control after {} attempt(s)",
                    self.placement.id,
                    state.attempts
                );
                AfterFetch::Done(AttemptOutcome::Created(control))
            }
            Err(err) => {
                widget_warn!("placement {} could not mount control: {}", self.placement.id, err);
                AfterFetch::Retry
            }
        }
    }

    async fn retry_later(&self) -> AttemptOutcome {
        let mut state = self.state.lock().await;
        if state.fail_attempt() {
            self.dispose(&mut state);
            widget_warn!(
                "placement {} gave up after {} attempts",
                self.placement.id,
                state.attempts
            );
            return AttemptOutcome::Exhausted;
        }
        let delay = self.settings.backoff_delay(state.attempts);
        self.schedule_locked(&mut state, delay, Trigger::Backoff);
        AttemptOutcome::Rescheduled(delay)
    }

    /// Forwards a trigger from a synchronous host callback.
    pub fn signal(&self, trigger: Trigger) {
        if self.cancel.is_cancelled() {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.attempt(trigger).await;
        });
    }

    pub async fn schedule(&self, delay: Duration, trigger: Trigger) {
        let mut state = self.state.lock().await;
        self.schedule_locked(&mut state, delay, trigger);
    }

    fn schedule_locked(&self, state: &mut InjectionState, delay: Duration, trigger: Trigger) {
        if state.is_terminal() || self.cancel.is_cancelled() {
            return;
        }
        let handle = self.spawn_timer(delay, trigger);
        state.resources.timers.retain(|timer| !timer.is_finished());
        state.resources.timers.push(handle);
    }

    /// The handle owns only the sleep. The attempt runs in its own task, so
    /// aborting a timer can never strand a fetch between the two guard checks.
    fn spawn_timer(&self, delay: Duration, trigger: Trigger) -> JoinHandle<()> {
        let this = self.clone();
        let token = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = time::sleep(delay) => this.signal(trigger),
            }
        })
    }

    /// Collapses a burst of DOM changes into one attempt after the debounce delay.
    pub fn signal_debounced(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.restart_debounce().await;
        });
    }

    async fn restart_debounce(&self) {
        let mut state = self.state.lock().await;
        if state.is_terminal() || self.cancel.is_cancelled() {
            return;
        }
        if let Some(pending) = state.resources.debounce.take() {
            pending.abort();
        }
        state.resources.debounce = Some(self.spawn_timer(self.settings.debounce(), Trigger::Mutation));
    }

    /// Starts watching the body for content that may make this placement
    /// ready. The observer is released when the placement settles.
    pub async fn watch_host_page(&self) {
        let this = self.clone();
        let observer = watcher::watch_body(&self.host, WatchFilter::NonScriptElements, move || {
            this.signal_debounced();
        });
        self.adopt_observer(observer).await;
    }

    pub async fn adopt_observer(&self, observer: ObserverId) {
        let mut state = self.state.lock().await;
        if state.is_terminal() || self.cancel.is_cancelled() {
            self.host.disconnect(observer);
            return;
        }
        if let Some(previous) = state.resources.observer.replace(observer) {
            self.host.disconnect(previous);
        }
    }

    /// Subscribes to DOMContentLoaded (while the page is still loading) and
    /// window load.
    pub async fn subscribe_page_events(&self) {
        let mut listeners = Vec::new();
        if self.host.ready_state() == ReadyState::Loading {
            listeners.push(self.listen(
                ListenerTarget::Document,
                EventKind::DomContentLoaded,
                Trigger::DomContentLoaded,
            ));
        }
        listeners.push(self.listen(ListenerTarget::Window, EventKind::Load, Trigger::WindowLoad));

        let mut state = self.state.lock().await;
        if state.is_terminal() || self.cancel.is_cancelled() {
            for listener in listeners {
                self.host.remove_listener(listener);
            }
            return;
        }
        state.resources.listeners.extend(listeners);
    }

    fn listen(&self, target: ListenerTarget, kind: EventKind, trigger: Trigger) -> ListenerId {
        let this = self.clone();
        self.host.add_listener(
            target,
            kind,
            Arc::new(move |_: &HostEvent| {
                this.signal(trigger);
                Propagation::Continue
            }),
        )
    }

    /// Releases everything without reaching a terminal state, e.g. on page
    /// teardown.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        self.dispose(&mut state);
    }

    /// Makes every owned timer, observer and listener inert.
    fn dispose(&self, state: &mut InjectionState) {
        self.cancel.cancel();
        let resources = state.take_resources();
        for timer in resources.timers {
            timer.abort();
        }
        if let Some(debounce) = resources.debounce {
            debounce.abort();
        }
        if let Some(observer) = resources.observer {
            self.host.disconnect(observer);
        }
        for listener in resources.listeners {
            self.host.remove_listener(listener);
        }
    }
}
