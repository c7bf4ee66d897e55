use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

use serde_json::Value;

use super::{
    AddedNode, ElementId, EventCallback, EventKind, HostError, HostEvent, HostPage, ListenerId,
    ListenerTarget, MutationCallback, MutationRecord, ObserverId, Propagation, ReadyState,
};

#[derive(Debug, Default)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    styles: BTreeMap<String, String>,
    text: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

struct Listener {
    target: ListenerTarget,
    kind: EventKind,
    callback: EventCallback,
}

struct PageInner {
    nodes: HashMap<ElementId, Node>,
    next_id: u64,
    root: ElementId,
    head: ElementId,
    body: ElementId,
    listeners: BTreeMap<ListenerId, Listener>,
    observers: BTreeMap<ObserverId, MutationCallback>,
    ready_state: ReadyState,
    viewport_width: u32,
    href: String,
    current_script: Option<ElementId>,
    focused: Option<ElementId>,
    opened: Vec<String>,
    messages: Vec<(ElementId, Value)>,
    frames_without_window: Vec<ElementId>,
    read_only: bool,
    rejected_style: Option<String>,
}

impl PageInner {
    fn alloc(&mut self, tag: &str) -> ElementId {
        self.next_id += 1;
        let id = ElementId(self.next_id);
        self.nodes.insert(
            id,
            Node {
                tag: tag.to_ascii_lowercase(),
                ..Node::default()
            },
        );
        id
    }

    fn node(&self, id: ElementId) -> Result<&Node, HostError> {
        self.nodes.get(&id).ok_or(HostError::MissingElement(id))
    }

    fn node_mut(&mut self, id: ElementId) -> Result<&mut Node, HostError> {
        self.nodes.get_mut(&id).ok_or(HostError::MissingElement(id))
    }

    fn is_attached(&self, id: ElementId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                return true;
            }
            cursor = self.nodes.get(&current).and_then(|node| node.parent);
        }
        false
    }

    fn is_under_body(&self, id: ElementId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.body {
                return self.is_attached(self.body);
            }
            cursor = self.nodes.get(&current).and_then(|node| node.parent);
        }
        false
    }

    fn detach(&mut self, id: ElementId) {
        let parent = self.nodes.get(&id).and_then(|node| node.parent);
        if let Some(parent) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|child| *child != id);
            }
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = None;
        }
    }

    fn ancestors_and_self(&self, id: ElementId) -> Vec<ElementId> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.nodes.get(&current).and_then(|node| node.parent);
        }
        chain
    }

    fn attached_in_order(&self) -> Vec<ElementId> {
        let mut ordered = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            ordered.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        ordered
    }

    fn has_class(&self, id: ElementId, class: &str) -> bool {
        self.nodes
            .get(&id)
            .and_then(|node| node.attributes.get("class"))
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    fn mutation_for(&self, parent: ElementId, child: ElementId) -> Option<MutationRecord> {
        if !self.is_under_body(parent) {
            return None;
        }
        let tag = self.nodes.get(&child)?.tag.clone();
        let added = if tag == "#text" {
            AddedNode::Text
        } else {
            AddedNode::Element { id: child, tag }
        };
        Some(MutationRecord { added: vec![added] })
    }
}

/// Headless in-memory document.
///
/// Starts as `<html><head/><body/></html>` in the `Complete` ready state with
/// a desktop-sized viewport. Helpers outside [`HostPage`] let callers build
/// host markup, fire events, and inspect what the widget did.
pub struct MemoryPage {
    inner: Mutex<PageInner>,
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPage {
    pub fn new() -> Self {
        let mut inner = PageInner {
            nodes: HashMap::new(),
            next_id: 0,
            root: ElementId(0),
            head: ElementId(0),
            body: ElementId(0),
            listeners: BTreeMap::new(),
            observers: BTreeMap::new(),
            ready_state: ReadyState::Complete,
            viewport_width: 1280,
            href: "https://careers.example.com/jobs/42".to_string(),
            current_script: None,
            focused: None,
            opened: Vec::new(),
            messages: Vec::new(),
            frames_without_window: Vec::new(),
            read_only: false,
            rejected_style: None,
        };
        let root = inner.alloc("html");
        let head = inner.alloc("head");
        let body = inner.alloc("body");
        for child in [head, body] {
            if let Some(node) = inner.nodes.get_mut(&child) {
                node.parent = Some(root);
            }
        }
        if let Some(node) = inner.nodes.get_mut(&root) {
            node.children = vec![head, body];
        }
        inner.root = root;
        inner.head = head;
        inner.body = body;
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PageInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        self.lock().ready_state = state;
    }

    pub fn set_viewport_width(&self, width: u32) {
        self.lock().viewport_width = width;
    }

    pub fn set_location_href(&self, href: &str) {
        self.lock().href = href.to_string();
    }

    pub fn set_current_script(&self, script: Option<ElementId>) {
        self.lock().current_script = script;
    }

    /// Makes `post_message` to this frame fail, as for a frame whose content
    /// window is gone.
    pub fn drop_frame_window(&self, frame: ElementId) {
        self.lock().frames_without_window.push(frame);
    }

    /// Makes every insertion fail, as on a page that freezes its tree.
    pub fn set_read_only(&self, read_only: bool) {
        self.lock().read_only = read_only;
    }

    /// Makes writes to one style property fail, as for a host stylesheet
    /// policy that refuses it.
    pub fn set_rejected_style(&self, property: Option<&str>) {
        self.lock().rejected_style = property.map(str::to_string);
    }

    /// Creates an element with attributes and appends it under `parent`.
    pub fn append_element(
        &self,
        parent: ElementId,
        tag: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> Result<ElementId, HostError> {
        let id = self.create_element(tag);
        for (name, value) in attributes {
            self.set_attribute(id, name, value)?;
        }
        if !text.is_empty() {
            self.set_text(id, text)?;
        }
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Removes `id` from its parent without deleting it, as a framework
    /// re-render would.
    pub fn detach(&self, id: ElementId) {
        self.lock().detach(id);
    }

    /// Fires `event` at `target`, bubbling through ancestors and then the
    /// document for bubbling kinds. Returns true if a listener prevented the
    /// default action.
    pub fn dispatch(&self, target: ListenerTarget, event: HostEvent) -> bool {
        let kind = event.kind();
        let route: Vec<ListenerTarget> = {
            let inner = self.lock();
            match target {
                ListenerTarget::Element(id) if kind.bubbles() => inner
                    .ancestors_and_self(id)
                    .into_iter()
                    .map(ListenerTarget::Element)
                    .chain(std::iter::once(ListenerTarget::Document))
                    .collect(),
                other => vec![other],
            }
        };

        let mut prevented = false;
        for hop in route {
            let candidates: Vec<ListenerId> = {
                let inner = self.lock();
                inner
                    .listeners
                    .iter()
                    .filter(|(_, l)| l.target == hop && l.kind == kind)
                    .map(|(id, _)| *id)
                    .collect()
            };
            for listener_id in candidates {
                // Listeners removed by an earlier callback in this dispatch do not fire.
                let callback = {
                    let inner = self.lock();
                    inner.listeners.get(&listener_id).map(|l| l.callback.clone())
                };
                if let Some(callback) = callback {
                    if callback(&event) == Propagation::PreventDefault {
                        prevented = true;
                    }
                }
            }
        }
        prevented
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.lock().nodes.get(&id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: ElementId) -> Vec<ElementId> {
        self.lock()
            .nodes
            .get(&id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Attached elements carrying `name`, in document order.
    pub fn elements_with_attribute(&self, name: &str) -> Vec<ElementId> {
        let inner = self.lock();
        inner
            .attached_in_order()
            .into_iter()
            .filter(|id| {
                inner
                    .nodes
                    .get(id)
                    .map(|node| node.attributes.contains_key(name))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn focused(&self) -> Option<ElementId> {
        self.lock().focused
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    pub fn posted_messages(&self) -> Vec<(ElementId, Value)> {
        self.lock().messages.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn listener_count_for(&self, target: ListenerTarget, kind: EventKind) -> usize {
        self.lock()
            .listeners
            .values()
            .filter(|l| l.target == target && l.kind == kind)
            .count()
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    fn notify_observers(&self, record: Option<MutationRecord>) {
        let Some(record) = record else {
            return;
        };
        let observers: Vec<MutationCallback> = self.lock().observers.values().cloned().collect();
        let records = [record];
        for observer in observers {
            observer(&records);
        }
    }
}

impl HostPage for MemoryPage {
    fn head(&self) -> ElementId {
        self.lock().head
    }

    fn body(&self) -> ElementId {
        self.lock().body
    }

    fn ready_state(&self) -> ReadyState {
        self.lock().ready_state
    }

    fn location_href(&self) -> String {
        self.lock().href.clone()
    }

    fn viewport_width(&self) -> u32 {
        self.lock().viewport_width
    }

    fn current_script(&self) -> Option<ElementId> {
        self.lock().current_script
    }

    fn element_by_dom_id(&self, dom_id: &str) -> Option<ElementId> {
        let inner = self.lock();
        inner.attached_in_order().into_iter().find(|id| {
            inner
                .nodes
                .get(id)
                .and_then(|node| node.attributes.get("id"))
                .map(|value| value == dom_id)
                .unwrap_or(false)
        })
    }

    fn elements_by_tag(&self, tag: &str) -> Vec<ElementId> {
        let tag = tag.to_ascii_lowercase();
        let inner = self.lock();
        inner
            .attached_in_order()
            .into_iter()
            .filter(|id| inner.nodes.get(id).map(|n| n.tag == tag).unwrap_or(false))
            .collect()
    }

    fn elements_with_class(&self, class: &str) -> Vec<ElementId> {
        let inner = self.lock();
        inner
            .attached_in_order()
            .into_iter()
            .filter(|id| inner.has_class(*id, class))
            .collect()
    }

    fn subtree_has_class(&self, root: ElementId, class: &str) -> bool {
        let inner = self.lock();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if inner.has_class(id, class) {
                return true;
            }
            if let Some(node) = inner.nodes.get(&id) {
                stack.extend(node.children.iter().copied());
            }
        }
        false
    }

    fn create_element(&self, tag: &str) -> ElementId {
        self.lock().alloc(tag)
    }

    fn tag_name(&self, id: ElementId) -> Option<String> {
        self.lock().nodes.get(&id).map(|node| node.tag.clone())
    }

    fn is_attached(&self, id: ElementId) -> bool {
        self.lock().is_attached(id)
    }

    fn append_child(&self, parent: ElementId, child: ElementId) -> Result<(), HostError> {
        let record = {
            let mut inner = self.lock();
            if inner.read_only {
                return Err(HostError::Rejected("document is read-only".into()));
            }
            inner.node(parent)?;
            inner.node(child)?;
            if inner.ancestors_and_self(parent).contains(&child) {
                return Err(HostError::Hierarchy(child));
            }
            inner.detach(child);
            inner.node_mut(parent)?.children.push(child);
            inner.node_mut(child)?.parent = Some(parent);
            inner.mutation_for(parent, child)
        };
        self.notify_observers(record);
        Ok(())
    }

    fn insert_after(&self, anchor: ElementId, node: ElementId) -> Result<(), HostError> {
        let record = {
            let mut inner = self.lock();
            if inner.read_only {
                return Err(HostError::Rejected("document is read-only".into()));
            }
            inner.node(node)?;
            let parent = inner
                .node(anchor)?
                .parent
                .ok_or(HostError::Detached(anchor))?;
            if inner.ancestors_and_self(parent).contains(&node) {
                return Err(HostError::Hierarchy(node));
            }
            inner.detach(node);
            let siblings = &mut inner.node_mut(parent)?.children;
            let position = siblings
                .iter()
                .position(|sibling| *sibling == anchor)
                .map(|index| index + 1)
                .unwrap_or(siblings.len());
            siblings.insert(position, node);
            inner.node_mut(node)?.parent = Some(parent);
            inner.mutation_for(parent, node)
        };
        self.notify_observers(record);
        Ok(())
    }

    fn remove(&self, id: ElementId) -> Result<(), HostError> {
        let mut inner = self.lock();
        inner.node(id)?;
        inner.detach(id);
        Ok(())
    }

    fn attribute(&self, id: ElementId, name: &str) -> Option<String> {
        self.lock()
            .nodes
            .get(&id)
            .and_then(|node| node.attributes.get(name).cloned())
    }

    fn set_attribute(&self, id: ElementId, name: &str, value: &str) -> Result<(), HostError> {
        self.lock()
            .node_mut(id)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn has_class(&self, id: ElementId, class: &str) -> bool {
        self.lock().has_class(id, class)
    }

    fn text(&self, id: ElementId) -> String {
        self.lock()
            .nodes
            .get(&id)
            .map(|node| node.text.clone())
            .unwrap_or_default()
    }

    fn set_text(&self, id: ElementId, text: &str) -> Result<(), HostError> {
        self.lock().node_mut(id)?.text = text.to_string();
        Ok(())
    }

    fn style(&self, id: ElementId, property: &str) -> String {
        self.lock()
            .nodes
            .get(&id)
            .and_then(|node| node.styles.get(property).cloned())
            .unwrap_or_default()
    }

    fn set_style(&self, id: ElementId, property: &str, value: &str) -> Result<(), HostError> {
        let mut inner = self.lock();
        if inner.rejected_style.as_deref() == Some(property) {
            return Err(HostError::Rejected(format!("style {property} refused")));
        }
        let styles = &mut inner.node_mut(id)?.styles;
        if value.is_empty() {
            styles.remove(property);
        } else {
            styles.insert(property.to_string(), value.to_string());
        }
        Ok(())
    }

    fn focus(&self, id: ElementId) -> Result<(), HostError> {
        let mut inner = self.lock();
        if !inner.is_attached(id) {
            return Err(HostError::Detached(id));
        }
        inner.focused = Some(id);
        Ok(())
    }

    fn add_listener(
        &self,
        target: ListenerTarget,
        kind: EventKind,
        callback: EventCallback,
    ) -> ListenerId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner.listeners.insert(
            id,
            Listener {
                target,
                kind,
                callback,
            },
        );
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.lock().listeners.remove(&id);
    }

    fn observe_body(&self, callback: MutationCallback) -> ObserverId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = ObserverId(inner.next_id);
        inner.observers.insert(id, callback);
        id
    }

    fn disconnect(&self, id: ObserverId) {
        self.lock().observers.remove(&id);
    }

    fn open_new_context(&self, url: &str) {
        self.lock().opened.push(url.to_string());
    }

    fn post_message(&self, frame: ElementId, message: Value) -> Result<(), HostError> {
        let mut inner = self.lock();
        if inner.frames_without_window.contains(&frame) || !inner.is_attached(frame) {
            return Err(HostError::Rejected("frame has no content window".into()));
        }
        inner.messages.push((frame, message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn insert_after_places_node_as_next_sibling() {
        let page = MemoryPage::new();
        let body = page.body();
        let first = page.append_element(body, "p", &[], "one").unwrap();
        let last = page.append_element(body, "p", &[], "three").unwrap();
        let middle = page.create_element("p");

        page.insert_after(first, middle).unwrap();

        assert_eq!(page.children(body), vec![first, middle, last]);
        assert!(page.is_attached(middle));
    }

    #[test]
    fn detached_subtree_is_not_attached() {
        let page = MemoryPage::new();
        let wrapper = page.append_element(page.body(), "div", &[], "").unwrap();
        let inner = page.append_element(wrapper, "span", &[], "").unwrap();

        page.detach(wrapper);

        assert!(!page.is_attached(inner));
        assert_eq!(
            page.insert_after(wrapper, page.create_element("b")),
            Err(HostError::Detached(wrapper))
        );
    }

    #[test]
    fn appending_an_ancestor_under_its_descendant_is_rejected() {
        let page = MemoryPage::new();
        let outer = page.append_element(page.body(), "div", &[], "").unwrap();
        let inner = page.append_element(outer, "span", &[], "").unwrap();

        assert_eq!(page.append_child(inner, outer), Err(HostError::Hierarchy(outer)));
        assert_eq!(page.append_child(outer, outer), Err(HostError::Hierarchy(outer)));
        assert_eq!(page.insert_after(inner, outer), Err(HostError::Hierarchy(outer)));

        assert!(page.is_attached(inner));
        assert_eq!(page.children(outer), vec![inner]);
    }

    #[test]
    fn observers_only_see_insertions_under_body() {
        let page = MemoryPage::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        page.observe_body(Arc::new(move |records: &[MutationRecord]| {
            counter.fetch_add(records.len(), Ordering::SeqCst);
        }));

        page.append_element(page.head(), "style", &[], "").unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        page.append_element(page.body(), "div", &[], "").unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn click_bubbles_to_ancestors_and_document() {
        let page = MemoryPage::new();
        let outer = page.append_element(page.body(), "div", &[], "").unwrap();
        let inner = page.append_element(outer, "button", &[], "").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        for target in [ListenerTarget::Element(outer), ListenerTarget::Document] {
            let hits = hits.clone();
            page.add_listener(
                target,
                EventKind::Click,
                Arc::new(move |_: &HostEvent| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Propagation::Continue
                }),
            );
        }

        page.dispatch(ListenerTarget::Element(inner), HostEvent::Click { target: inner });

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_removed_mid_dispatch_does_not_fire() {
        let page = Arc::new(MemoryPage::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let second_id = Arc::new(Mutex::new(None::<ListenerId>));

        let remover_page = page.clone();
        let remover_target = second_id.clone();
        page.add_listener(
            ListenerTarget::Document,
            EventKind::KeyDown,
            Arc::new(move |_: &HostEvent| {
                if let Some(id) = *remover_target.lock().unwrap() {
                    remover_page.remove_listener(id);
                }
                Propagation::Continue
            }),
        );
        let counter = fired.clone();
        let id = page.add_listener(
            ListenerTarget::Document,
            EventKind::KeyDown,
            Arc::new(move |_: &HostEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
                Propagation::Continue
            }),
        );
        *second_id.lock().unwrap() = Some(id);

        page.dispatch(
            ListenerTarget::Document,
            HostEvent::KeyDown {
                key: "Escape".into(),
            },
        );

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clearing_a_style_removes_it() {
        let page = MemoryPage::new();
        let body = page.body();
        page.set_style(body, "overflow", "hidden").unwrap();
        assert_eq!(page.style(body, "overflow"), "hidden");
        page.set_style(body, "overflow", "").unwrap();
        assert_eq!(page.style(body, "overflow"), "");
    }
}
