//! Page-level entry points for the two embed styles.

use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, time};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ConfigSource, EmbedMode},
    control,
    coordinator::{InjectionCoordinator, InjectionSnapshot, Trigger},
    host::{HostPage, ObserverId},
    modal::ModalController,
    placement::{
        scan_enhanced_placements, scan_script_placements, PlacementDescriptor, COMPANY_ID_ATTR,
    },
    settings::WidgetSettings,
    style::{self, ENHANCED_CLASS},
    watcher::{self, WatchFilter},
};

const ENABLE_LOGS: bool = true;

use crate::{widget_info, widget_warn};

/// Delay before rescanning after a widget anchor shows up in the DOM, so a
/// framework can finish rendering the surrounding markup.
pub const RESCAN_DELAY: Duration = Duration::from_millis(100);

/// Everything the widget runs on one host page. Shares one modal controller
/// across placements.
#[derive(Clone)]
pub struct WidgetRuntime {
    host: Arc<dyn HostPage>,
    source: Arc<dyn ConfigSource>,
    settings: WidgetSettings,
    modals: ModalController,
    coordinators: Arc<Mutex<Vec<InjectionCoordinator>>>,
    discovery: Arc<Mutex<Option<ObserverId>>>,
    cancel: CancellationToken,
}

impl WidgetRuntime {
    pub fn new(
        host: Arc<dyn HostPage>,
        source: Arc<dyn ConfigSource>,
        settings: WidgetSettings,
    ) -> Self {
        Self {
            modals: ModalController::new(host.clone(), settings.clone()),
            host,
            source,
            settings,
            coordinators: Arc::new(Mutex::new(Vec::new())),
            discovery: Arc::new(Mutex::new(None)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn modals(&self) -> &ModalController {
        &self.modals
    }

    pub async fn boot(&self, mode: EmbedMode) -> Vec<InjectionCoordinator> {
        match mode {
            EmbedMode::Script => self.boot_script().await,
            EmbedMode::Enhanced => self.boot_enhanced().await,
        }
    }

    /// Starts a placement for every unprocessed embed script.
    pub async fn boot_script(&self) -> Vec<InjectionCoordinator> {
        if self.cancel.is_cancelled() {
            return Vec::new();
        }
        let placements = scan_script_placements(self.host.as_ref());
        if placements.is_empty() {
            widget_warn!("no embed script carrying {} found", COMPANY_ID_ATTR);
        }
        let mut started = Vec::with_capacity(placements.len());
        for placement in placements {
            started.extend(self.start_placement(placement).await);
        }
        started
    }

    /// Enhances every anchor already on the page, then keeps watching for
    /// anchors rendered later.
    pub async fn boot_enhanced(&self) -> Vec<InjectionCoordinator> {
        style::ensure_styles(self.host.as_ref(), EmbedMode::Enhanced);
        let started = self.enhance_new_anchors().await;
        self.watch_for_anchors().await;
        started
    }

    async fn enhance_new_anchors(&self) -> Vec<InjectionCoordinator> {
        let mut started = Vec::new();
        if self.cancel.is_cancelled() {
            return started;
        }
        for placement in scan_enhanced_placements(self.host.as_ref()) {
            if let Err(err) = control::apply_enhanced_defaults(self.host.as_ref(), placement.anchor) {
                widget_warn!("could not style anchor for company {}: {}", placement.company_id, err);
            }
            started.extend(self.start_placement(placement).await);
        }
        if !started.is_empty() {
            widget_info!("enhancing {} widget anchor(s)", started.len());
        }
        started
    }

    async fn watch_for_anchors(&self) {
        let this = self.clone();
        let observer = watcher::watch_body(
            &self.host,
            WatchFilter::SubtreeClass(ENHANCED_CLASS),
            move || {
                let this = this.clone();
                let token = this.cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = time::sleep(RESCAN_DELAY) => {
                            this.enhance_new_anchors().await;
                        }
                    }
                });
            },
        );
        let mut discovery = self.discovery.lock().await;
        if self.cancel.is_cancelled() {
            self.host.disconnect(observer);
            return;
        }
        if let Some(previous) = discovery.replace(observer) {
            self.host.disconnect(previous);
        }
    }

    /// Wires one placement to every retry source: the initial attempt, page
    /// load events, the fallback timers and body mutations. Returns `None`
    /// once the runtime has shut down.
    async fn start_placement(
        &self,
        placement: PlacementDescriptor,
    ) -> Option<InjectionCoordinator> {
        let coordinator = InjectionCoordinator::new(
            placement,
            self.host.clone(),
            self.source.clone(),
            self.modals.clone(),
            self.settings.clone(),
        );
        {
            // Registered before any wiring so a concurrent shutdown stops it.
            let mut coordinators = self.coordinators.lock().await;
            if self.cancel.is_cancelled() {
                return None;
            }
            coordinators.push(coordinator.clone());
        }

        coordinator.subscribe_page_events().await;
        coordinator.watch_host_page().await;
        for delay in &self.settings.fallback_delays_ms {
            coordinator
                .schedule(Duration::from_millis(*delay), Trigger::Fallback)
                .await;
        }
        coordinator.signal(Trigger::Initial);
        Some(coordinator)
    }

    pub async fn coordinators(&self) -> Vec<InjectionCoordinator> {
        self.coordinators.lock().await.clone()
    }

    pub async fn snapshots(&self) -> Vec<InjectionSnapshot> {
        let mut snapshots = Vec::new();
        for coordinator in self.coordinators().await {
            snapshots.push(coordinator.snapshot().await);
        }
        snapshots
    }

    /// Resolves once every placement started so far has settled.
    pub async fn settled(&self) {
        for coordinator in self.coordinators().await {
            coordinator.settled().await;
        }
    }

    /// Detaches the anchor watcher, drops pending rescans and stops every
    /// placement that is still retrying. Nothing starts afterwards.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(observer) = self.discovery.lock().await.take() {
            self.host.disconnect(observer);
        }
        for coordinator in self.coordinators().await {
            coordinator.stop().await;
        }
    }
}
