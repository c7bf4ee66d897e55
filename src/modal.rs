//! The chat dialog opened when a user activates a widget control.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
    time::Duration,
};

use serde_json::json;
use uuid::Uuid;

use crate::host::{
    apply_styles, ElementId, EventKind, HostError, HostEvent, HostPage, ListenerId,
    ListenerTarget, Propagation,
};
use crate::settings::WidgetSettings;

const ENABLE_LOGS: bool = true;

use crate::{widget_info, widget_warn};

pub const FRAME_LABEL: &str = "Career Chat Assistant";
pub const DIALOG_LABEL: &str = "Job Application Chat";
pub const OVERLAY_CLASS: &str = "ondework-chat-overlay";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    CloseButton,
    OutsideClick,
    Escape,
    FrameError,
}

/// Result of a control activation at the click-handler boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Opened(Uuid),
    /// The modal could not be built; the chat was opened in a new browsing context.
    FellBack(String),
}

type ActiveSlot = Arc<Mutex<Option<Arc<ModalSession>>>>;

fn lock_slot(slot: &Mutex<Option<Arc<ModalSession>>>) -> MutexGuard<'_, Option<Arc<ModalSession>>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Opens chat dialogs. At most one session is open at a time, so the saved
/// body overflow always belongs to the page rather than to another session.
#[derive(Clone)]
pub struct ModalController {
    host: Arc<dyn HostPage>,
    settings: WidgetSettings,
    active: ActiveSlot,
}

impl ModalController {
    pub fn new(host: Arc<dyn HostPage>, settings: WidgetSettings) -> Self {
        Self {
            host,
            settings,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn active_session(&self) -> Option<Arc<ModalSession>> {
        lock_slot(&self.active).clone()
    }

    /// Click-handler boundary: any failure to build the dialog degrades to
    /// opening the chat URL in a new browsing context.
    pub fn activate(&self, company_id: &str) -> Activation {
        let referrer = self.host.location_href();
        match self.open(company_id, &referrer) {
            Ok(session) => Activation::Opened(session.id()),
            Err(err) => {
                let fallback = self.settings.chat_url(company_id, &referrer);
                widget_warn!("chat modal failed ({}), opening in new tab", err);
                self.host.open_new_context(&fallback);
                Activation::FellBack(fallback)
            }
        }
    }

    /// Opens the dialog, or returns the session that is already open.
    pub fn open(&self, company_id: &str, referrer: &str) -> Result<Arc<ModalSession>, HostError> {
        let mut slot = lock_slot(&self.active);
        if let Some(existing) = slot.as_ref() {
            if !existing.is_closed() {
                return Ok(existing.clone());
            }
        }
        // A closed dialog may still be waiting out its shutdown grace.
        for stale in self.host.elements_with_class(OVERLAY_CLASS) {
            let _ = self.host.remove(stale);
        }

        let session = ModalSession::build(
            self.host.clone(),
            &self.settings,
            company_id,
            referrer,
            Arc::downgrade(&self.active),
        )?;
        *slot = Some(session.clone());
        widget_info!("chat modal {} opened for company {}", session.id(), company_id);
        Ok(session)
    }
}

struct Layout {
    mobile: bool,
}

impl Layout {
    fn overlay(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("position", "fixed"),
            ("inset", "0"),
            ("background", "rgba(0, 0, 0, 0.3)"),
            ("z-index", "9999"),
            ("display", "flex"),
            ("justify-content", "center"),
            ("align-items", "center"),
            ("padding", if self.mobile { "0" } else { "16px" }),
        ]
    }

    fn wrapper(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("position", "relative"),
            ("width", "100%"),
            ("max-width", if self.mobile { "100vw" } else { "420px" }),
        ]
    }

    fn frame(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("width", if self.mobile { "100vw" } else { "100%" }),
            ("height", if self.mobile { "100vh" } else { "90vh" }),
            ("border", "none"),
            ("border-radius", if self.mobile { "0px" } else { "10px" }),
            (
                "box-shadow",
                if self.mobile { "none" } else { "0 0 20px rgba(0,0,0,0.3)" },
            ),
            ("background", "#fff"),
        ]
    }

    fn close_button(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("position", "absolute"),
            ("top", if self.mobile { "16px" } else { "10px" }),
            ("right", if self.mobile { "16px" } else { "10px" }),
            ("z-index", "1000"),
            ("font-size", if self.mobile { "28px" } else { "24px" }),
            ("padding", if self.mobile { "10px 14px" } else { "8px 12px" }),
            ("border-radius", "50%"),
            ("border", "none"),
            ("background", "#fff"),
            ("cursor", "pointer"),
            ("box-shadow", "0 2px 6px rgba(0,0,0,0.2)"),
            ("transition", "background-color 0.2s ease"),
        ]
    }
}

/// One open chat dialog. Closing is exactly-once: whichever of the close
/// button, outside click, Escape, or frame error arrives first wins and
/// detaches the rest.
pub struct ModalSession {
    id: Uuid,
    host: Arc<dyn HostPage>,
    overlay: ElementId,
    frame: ElementId,
    close_button: ElementId,
    prior_overflow: String,
    fallback_url: String,
    notify_frame: bool,
    shutdown_grace: Duration,
    listeners: Mutex<Vec<ListenerId>>,
    closed: AtomicBool,
    slot: Weak<Mutex<Option<Arc<ModalSession>>>>,
}

impl ModalSession {
    fn build(
        host: Arc<dyn HostPage>,
        settings: &WidgetSettings,
        company_id: &str,
        referrer: &str,
        slot: Weak<Mutex<Option<Arc<ModalSession>>>>,
    ) -> Result<Arc<Self>, HostError> {
        let layout = Layout {
            mobile: host.viewport_width() <= settings.mobile_breakpoint_px,
        };
        let chat_url = settings.chat_url(company_id, referrer);
        let body = host.body();

        let overlay = host.create_element("div");
        host.set_attribute(overlay, "class", OVERLAY_CLASS)?;
        host.set_attribute(overlay, "role", "dialog")?;
        host.set_attribute(overlay, "aria-modal", "true")?;
        host.set_attribute(overlay, "aria-label", DIALOG_LABEL)?;
        apply_styles(host.as_ref(), overlay, &layout.overlay())?;

        let wrapper = host.create_element("div");
        apply_styles(host.as_ref(), wrapper, &layout.wrapper())?;

        let frame = host.create_element("iframe");
        host.set_attribute(frame, "src", &chat_url)?;
        host.set_attribute(frame, "loading", "lazy")?;
        host.set_attribute(frame, "aria-label", FRAME_LABEL)?;
        apply_styles(host.as_ref(), frame, &layout.frame())?;

        let close_button = host.create_element("button");
        host.set_text(close_button, "×")?;
        host.set_attribute(close_button, "aria-label", "Close chat")?;
        apply_styles(host.as_ref(), close_button, &layout.close_button())?;

        host.append_child(wrapper, close_button)?;
        host.append_child(wrapper, frame)?;
        host.append_child(overlay, wrapper)?;
        host.append_child(body, overlay)?;

        let prior_overflow = host.style(body, "overflow");
        if let Err(err) = host.set_style(body, "overflow", "hidden") {
            let _ = host.remove(overlay);
            return Err(err);
        }

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            host: host.clone(),
            overlay,
            frame,
            close_button,
            prior_overflow,
            fallback_url: chat_url,
            notify_frame: settings.notify_frame_on_close,
            shutdown_grace: settings.shutdown_grace(),
            listeners: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            slot,
        });
        session.register_listeners();

        if let Err(err) = host.focus(close_button) {
            widget_warn!("could not focus chat close button: {}", err);
        }
        Ok(session)
    }

    fn register_listeners(self: &Arc<Self>) {
        let host = &self.host;
        let weak = Arc::downgrade(self);
        let on = |target: ListenerTarget,
                  kind: EventKind,
                  handler: fn(&ModalSession, &HostEvent)|
         -> ListenerId {
            let weak = weak.clone();
            host.add_listener(
                target,
                kind,
                Arc::new(move |event: &HostEvent| {
                    if let Some(session) = weak.upgrade() {
                        handler(&session, event);
                    }
                    Propagation::Continue
                }),
            )
        };

        let ids = vec![
            on(
                ListenerTarget::Element(self.close_button),
                EventKind::Click,
                |session, _| {
                    session.close(CloseReason::CloseButton);
                },
            ),
            on(
                ListenerTarget::Element(self.overlay),
                EventKind::Click,
                |session, event| {
                    if matches!(event, HostEvent::Click { target } if *target == session.overlay) {
                        session.close(CloseReason::OutsideClick);
                    }
                },
            ),
            on(ListenerTarget::Document, EventKind::KeyDown, |session, event| {
                if matches!(event, HostEvent::KeyDown { key } if key == "Escape") {
                    session.close(CloseReason::Escape);
                }
            }),
            on(
                ListenerTarget::Element(self.frame),
                EventKind::Error,
                |session, _| session.fail_over(),
            ),
            on(
                ListenerTarget::Element(self.close_button),
                EventKind::MouseEnter,
                |session, _| {
                    let _ = session.host.set_style(session.close_button, "background", "#f0f0f0");
                },
            ),
            on(
                ListenerTarget::Element(self.close_button),
                EventKind::MouseLeave,
                |session, _| {
                    let _ = session.host.set_style(session.close_button, "background", "#fff");
                },
            ),
        ];

        *self.lock_listeners() = ids;
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<ListenerId>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn overlay(&self) -> ElementId {
        self.overlay
    }

    pub fn frame(&self) -> ElementId {
        self.frame
    }

    pub fn close_button(&self) -> ElementId {
        self.close_button
    }

    pub fn fallback_url(&self) -> &str {
        &self.fallback_url
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tears the session down. Returns false if it was already closed.
    pub fn close(&self, reason: CloseReason) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        let listeners = std::mem::take(&mut *self.lock_listeners());
        for listener in listeners {
            self.host.remove_listener(listener);
        }

        let body = self.host.body();
        if let Err(err) = self.host.set_style(body, "overflow", &self.prior_overflow) {
            widget_warn!("could not restore body overflow: {}", err);
        }

        self.release_slot();
        self.remove_overlay(reason);
        widget_info!("chat modal {} closed ({:?})", self.id, reason);
        true
    }

    fn fail_over(&self) {
        widget_warn!("chat frame failed to load, opening fallback in new tab");
        if self.close(CloseReason::FrameError) {
            self.host.open_new_context(&self.fallback_url);
        }
    }

    fn release_slot(&self) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let mut guard = lock_slot(&slot);
        if guard.as_ref().map(|s| s.id == self.id).unwrap_or(false) {
            *guard = None;
        }
    }

    /// A failed frame is removed at once. Otherwise the frame is told to shut
    /// down and the overlay goes after a fixed grace delay.
    fn remove_overlay(&self, reason: CloseReason) {
        let notified = self.notify_frame
            && reason != CloseReason::FrameError
            && self
                .host
                .post_message(self.frame, json!({ "type": "shutdown" }))
                .is_ok();

        let runtime = tokio::runtime::Handle::try_current();
        match runtime {
            Ok(handle) if notified && !self.shutdown_grace.is_zero() => {
                let host = self.host.clone();
                let overlay = self.overlay;
                let grace = self.shutdown_grace;
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    let _ = host.remove(overlay);
                });
            }
            _ => {
                let _ = self.host.remove(self.overlay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryPage;

    fn controller(page: &Arc<MemoryPage>) -> ModalController {
        let settings = WidgetSettings {
            api_origin: "https://api.example.com".into(),
            ..WidgetSettings::default()
        };
        ModalController::new(page.clone(), settings)
    }

    fn escape() -> HostEvent {
        HostEvent::KeyDown {
            key: "Escape".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn close_restores_prior_non_empty_overflow() {
        let page = Arc::new(MemoryPage::new());
        page.set_style(page.body(), "overflow", "hidden").unwrap();
        let modals = controller(&page);

        let session = modals.open("acme", "https://host.example/").unwrap();
        assert_eq!(page.style(page.body(), "overflow"), "hidden");
        assert!(session.close(CloseReason::CloseButton));

        assert_eq!(page.style(page.body(), "overflow"), "hidden");

        page.set_style(page.body(), "overflow", "").unwrap();
        let session = modals.open("acme", "https://host.example/").unwrap();
        assert_eq!(page.style(page.body(), "overflow"), "hidden");
        session.close(CloseReason::CloseButton);
        assert_eq!(page.style(page.body(), "overflow"), "");
    }

    #[tokio::test(start_paused = true)]
    async fn escape_then_outside_click_closes_once() {
        let page = Arc::new(MemoryPage::new());
        let modals = controller(&page);
        let baseline = page.listener_count();
        let session = modals.open("acme", "https://host.example/").unwrap();
        let overlay = session.overlay();

        page.dispatch(ListenerTarget::Document, escape());
        page.dispatch(
            ListenerTarget::Element(overlay),
            HostEvent::Click { target: overlay },
        );

        assert!(session.is_closed());
        assert!(!session.close(CloseReason::OutsideClick));
        assert_eq!(page.listener_count(), baseline);
        assert!(modals.active_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn clicks_inside_dialog_do_not_close_it() {
        let page = Arc::new(MemoryPage::new());
        let modals = controller(&page);
        let session = modals.open("acme", "https://host.example/").unwrap();
        let frame = session.frame();

        page.dispatch(ListenerTarget::Element(frame), HostEvent::Click { target: frame });

        assert!(!session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_opens_do_not_accumulate_listeners() {
        let page = Arc::new(MemoryPage::new());
        let modals = controller(&page);

        for _ in 0..5 {
            let session = modals.open("acme", "https://host.example/").unwrap();
            page.dispatch(ListenerTarget::Document, escape());
            assert!(session.is_closed());
        }

        assert_eq!(page.listener_count_for(ListenerTarget::Document, EventKind::KeyDown), 0);
        assert_eq!(page.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn frame_error_removes_overlay_and_opens_fallback() {
        let page = Arc::new(MemoryPage::new());
        page.set_location_href("https://host.example/jobs?id=7");
        let modals = controller(&page);
        let session = modals
            .open("acme", "https://host.example/jobs?id=7")
            .unwrap();

        page.dispatch(ListenerTarget::Element(session.frame()), HostEvent::Error);

        assert!(!page.is_attached(session.overlay()));
        assert_eq!(
            page.opened_urls(),
            vec![
                "https://api.example.com/chat?company_id=acme&referrer=https%3A%2F%2Fhost.example%2Fjobs%3Fid%3D7"
                    .to_string()
            ]
        );
        assert!(page.posted_messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn close_sends_shutdown_then_removes_after_grace() {
        let page = Arc::new(MemoryPage::new());
        let modals = controller(&page);
        let session = modals.open("acme", "https://host.example/").unwrap();

        page.dispatch(
            ListenerTarget::Element(session.close_button()),
            HostEvent::Click {
                target: session.close_button(),
            },
        );

        let messages = page.posted_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].1, json!({ "type": "shutdown" }));
        assert!(page.is_attached(session.overlay()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!page.is_attached(session.overlay()));
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_during_grace_drops_the_closing_dialog() {
        let page = Arc::new(MemoryPage::new());
        let modals = controller(&page);
        let first = modals.open("acme", "https://host.example/").unwrap();
        first.close(CloseReason::CloseButton);
        assert!(page.is_attached(first.overlay()));

        let second = modals.open("acme", "https://host.example/").unwrap();

        assert!(!page.is_attached(first.overlay()));
        assert_eq!(page.elements_with_class(OVERLAY_CLASS), vec![second.overlay()]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(page.is_attached(second.overlay()));
        assert_eq!(page.elements_by_tag("iframe").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_frame_is_removed_without_waiting() {
        let page = Arc::new(MemoryPage::new());
        let modals = controller(&page);
        let session = modals.open("acme", "https://host.example/").unwrap();
        page.drop_frame_window(session.frame());

        session.close(CloseReason::Escape);

        assert!(!page.is_attached(session.overlay()));
    }

    #[tokio::test(start_paused = true)]
    async fn open_sets_aria_focus_and_mobile_layout() {
        let page = Arc::new(MemoryPage::new());
        page.set_viewport_width(375);
        let modals = controller(&page);
        let session = modals.open("acme", "https://host.example/").unwrap();

        assert_eq!(page.attribute(session.overlay(), "role").as_deref(), Some("dialog"));
        assert_eq!(page.attribute(session.overlay(), "aria-modal").as_deref(), Some("true"));
        assert_eq!(page.attribute(session.frame(), "loading").as_deref(), Some("lazy"));
        assert_eq!(page.focused(), Some(session.close_button()));
        assert_eq!(page.style(session.frame(), "height"), "100vh");
        assert_eq!(page.style(session.overlay(), "padding"), "0");
    }

    #[tokio::test(start_paused = true)]
    async fn second_open_reuses_live_session() {
        let page = Arc::new(MemoryPage::new());
        let modals = controller(&page);
        let first = modals.open("acme", "https://host.example/").unwrap();
        let second = modals.open("acme", "https://host.example/").unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(page.elements_by_tag("iframe").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn activation_falls_back_to_new_tab_when_dialog_cannot_mount() {
        let page = Arc::new(MemoryPage::new());
        page.set_location_href("https://host.example/careers");
        page.set_read_only(true);
        let modals = controller(&page);

        let activation = modals.activate("acme");

        let expected =
            "https://api.example.com/chat?company_id=acme&referrer=https%3A%2F%2Fhost.example%2Fcareers";
        assert_eq!(activation, Activation::FellBack(expected.to_string()));
        assert_eq!(page.opened_urls(), vec![expected.to_string()]);
        assert_eq!(page.style(page.body(), "overflow"), "");
    }
}
