//! Body mutation watching.

use std::sync::Arc;

use crate::host::{AddedNode, HostPage, MutationRecord, ObserverId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchFilter {
    /// Any inserted element other than a script tag.
    NonScriptElements,
    /// An inserted element that carries the class itself or on a descendant.
    SubtreeClass(&'static str),
}

impl WatchFilter {
    fn matches(self, host: &dyn HostPage, node: &AddedNode) -> bool {
        let AddedNode::Element { id, tag } = node else {
            return false;
        };
        match self {
            WatchFilter::NonScriptElements => !tag.eq_ignore_ascii_case("script"),
            WatchFilter::SubtreeClass(class) => host.subtree_has_class(*id, class),
        }
    }
}

/// Observes additions anywhere under the body and calls `on_change` once per
/// batch that contains a matching node. Text-only batches are ignored.
///
/// The caller owns the returned observer and must disconnect it.
pub fn watch_body<F>(host: &Arc<dyn HostPage>, filter: WatchFilter, on_change: F) -> ObserverId
where
    F: Fn() + Send + Sync + 'static,
{
    let page = Arc::downgrade(host);
    host.observe_body(Arc::new(move |records: &[MutationRecord]| {
        let Some(page) = page.upgrade() else {
            return;
        };
        let relevant = records
            .iter()
            .flat_map(|record| record.added.iter())
            .any(|node| filter.matches(page.as_ref(), node));
        if relevant {
            on_change();
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryPage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(
        filter: WatchFilter,
    ) -> (Arc<MemoryPage>, Arc<AtomicUsize>, ObserverId) {
        let page = Arc::new(MemoryPage::new());
        let host: Arc<dyn HostPage> = page.clone();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let observer = watch_body(&host, filter, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (page, hits, observer)
    }

    #[test]
    fn script_insertions_are_ignored() {
        let (page, hits, _) = counting(WatchFilter::NonScriptElements);

        page.append_element(page.body(), "script", &[("src", "x.js")], "")
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        page.append_element(page.body(), "section", &[], "").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn class_filter_sees_nested_anchor() {
        let (page, hits, _) = counting(WatchFilter::SubtreeClass("ondework-widget"));

        let card = page.create_element("div");
        page.append_element(card, "a", &[("class", "ondework-widget")], "")
            .unwrap();
        page.append_element(page.body(), "p", &[], "unrelated").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        page.append_child(page.body(), card).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disconnected_observer_stays_quiet() {
        let (page, hits, observer) = counting(WatchFilter::NonScriptElements);

        page.disconnect(observer);
        page.append_element(page.body(), "div", &[], "").unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(page.observer_count(), 0);
    }
}
