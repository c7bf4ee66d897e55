//! The slice of the host document the widget runtime touches.
//!
//! Everything the runtime does to a third-party page goes through
//! [`HostPage`]. A browser binding implements it over the real DOM;
//! [`memory::MemoryPage`] implements it headlessly for tests and the
//! `simulate` command.

pub mod memory;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryPage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("element {0:?} is not attached to the document")]
    Detached(ElementId),
    #[error("element {0:?} does not exist")]
    MissingElement(ElementId),
    #[error("element {0:?} cannot be inserted under its own descendant")]
    Hierarchy(ElementId),
    #[error("host rejected operation: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerTarget {
    Window,
    Document,
    Element(ElementId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DomContentLoaded,
    Load,
    KeyDown,
    Click,
    Error,
    MouseEnter,
    MouseLeave,
}

impl EventKind {
    /// Whether events of this kind propagate from the target up to the document.
    pub fn bubbles(self) -> bool {
        matches!(self, EventKind::KeyDown | EventKind::Click)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    DomContentLoaded,
    Load,
    KeyDown { key: String },
    Click { target: ElementId },
    Error,
    MouseEnter,
    MouseLeave,
}

impl HostEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            HostEvent::DomContentLoaded => EventKind::DomContentLoaded,
            HostEvent::Load => EventKind::Load,
            HostEvent::KeyDown { .. } => EventKind::KeyDown,
            HostEvent::Click { .. } => EventKind::Click,
            HostEvent::Error => EventKind::Error,
            HostEvent::MouseEnter => EventKind::MouseEnter,
            HostEvent::MouseLeave => EventKind::MouseLeave,
        }
    }
}

/// What a listener asks the host to do with the event's default action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    PreventDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddedNode {
    Text,
    Element { id: ElementId, tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MutationRecord {
    pub added: Vec<AddedNode>,
}

pub type EventCallback = Arc<dyn Fn(&HostEvent) -> Propagation + Send + Sync>;
pub type MutationCallback = Arc<dyn Fn(&[MutationRecord]) + Send + Sync>;

/// Host document operations, modelled on the DOM calls an embed script makes.
///
/// Implementations must invoke listener and observer callbacks without
/// holding any internal lock, since callbacks re-enter the page.
pub trait HostPage: Send + Sync {
    fn head(&self) -> ElementId;
    fn body(&self) -> ElementId;
    fn ready_state(&self) -> ReadyState;
    fn location_href(&self) -> String;
    fn viewport_width(&self) -> u32;

    /// The script element currently being evaluated, if the host knows it.
    fn current_script(&self) -> Option<ElementId>;
    fn element_by_dom_id(&self, dom_id: &str) -> Option<ElementId>;
    fn elements_by_tag(&self, tag: &str) -> Vec<ElementId>;
    fn elements_with_class(&self, class: &str) -> Vec<ElementId>;
    /// True if `root` or any of its descendants carries `class`.
    fn subtree_has_class(&self, root: ElementId, class: &str) -> bool;

    fn create_element(&self, tag: &str) -> ElementId;
    fn tag_name(&self, id: ElementId) -> Option<String>;
    fn is_attached(&self, id: ElementId) -> bool;
    fn append_child(&self, parent: ElementId, child: ElementId) -> Result<(), HostError>;
    /// Inserts `node` as the next sibling of `anchor`.
    fn insert_after(&self, anchor: ElementId, node: ElementId) -> Result<(), HostError>;
    fn remove(&self, id: ElementId) -> Result<(), HostError>;

    fn attribute(&self, id: ElementId, name: &str) -> Option<String>;
    fn set_attribute(&self, id: ElementId, name: &str, value: &str) -> Result<(), HostError>;
    fn has_class(&self, id: ElementId, class: &str) -> bool;
    fn text(&self, id: ElementId) -> String;
    fn set_text(&self, id: ElementId, text: &str) -> Result<(), HostError>;
    /// Inline style value; the empty string when unset.
    fn style(&self, id: ElementId, property: &str) -> String;
    /// Setting the empty string clears the property.
    fn set_style(&self, id: ElementId, property: &str, value: &str) -> Result<(), HostError>;

    fn focus(&self, id: ElementId) -> Result<(), HostError>;
    fn add_listener(
        &self,
        target: ListenerTarget,
        kind: EventKind,
        callback: EventCallback,
    ) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
    fn observe_body(&self, callback: MutationCallback) -> ObserverId;
    fn disconnect(&self, id: ObserverId);

    /// Opens `url` in a new browsing context.
    fn open_new_context(&self, url: &str);
    /// Posts `message` to the content window of a frame element.
    fn post_message(&self, frame: ElementId, message: Value) -> Result<(), HostError>;
}

/// Applies a list of inline style declarations, stopping at the first failure.
pub fn apply_styles(
    host: &dyn HostPage,
    id: ElementId,
    declarations: &[(&str, &str)],
) -> Result<(), HostError> {
    for (property, value) in declarations {
        host.set_style(id, property, value)?;
    }
    Ok(())
}
