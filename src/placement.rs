use serde::Serialize;
use uuid::Uuid;

use crate::config::EmbedMode;
use crate::host::{ElementId, HostPage};
use crate::style::ENHANCED_CLASS;

const ENABLE_LOGS: bool = true;

use crate::widget_warn;

pub const COMPANY_ID_ATTR: &str = "data-company-id";
pub const SCRIPT_PROCESSED_ATTR: &str = "data-widget-processed";
pub const ENHANCED_PROCESSED_ATTR: &str = "data-enhanced";
pub const SCRIPT_SRC_MARKER: &str = "widget.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PlacementId(Uuid);

impl PlacementId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for PlacementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One embed point on the host page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementDescriptor {
    pub id: PlacementId,
    pub company_id: String,
    /// The script tag or the pre-rendered anchor.
    pub anchor: ElementId,
    pub mode: EmbedMode,
}

impl PlacementDescriptor {
    pub fn is_processed(&self, host: &dyn HostPage) -> bool {
        host.attribute(self.anchor, processed_attr(self.mode)).is_some()
    }
}

fn processed_attr(mode: EmbedMode) -> &'static str {
    match mode {
        EmbedMode::Script => SCRIPT_PROCESSED_ATTR,
        EmbedMode::Enhanced => ENHANCED_PROCESSED_ATTR,
    }
}

fn claim(host: &dyn HostPage, anchor: ElementId, mode: EmbedMode) -> bool {
    if host.attribute(anchor, processed_attr(mode)).is_some() {
        return false;
    }
    host.set_attribute(anchor, processed_attr(mode), "true").is_ok()
}

/// Claims every unprocessed embed script, the currently evaluating one first.
pub fn scan_script_placements(host: &dyn HostPage) -> Vec<PlacementDescriptor> {
    let mut candidates: Vec<ElementId> = host.current_script().into_iter().collect();
    candidates.extend(host.elements_by_tag("script").into_iter().filter(|script| {
        host.attribute(*script, "src")
            .map(|src| src.contains(SCRIPT_SRC_MARKER))
            .unwrap_or(false)
    }));

    let mut placements = Vec::new();
    for script in candidates {
        let Some(company_id) = host
            .attribute(script, COMPANY_ID_ATTR)
            .filter(|id| !id.trim().is_empty())
        else {
            continue;
        };
        if !claim(host, script, EmbedMode::Script) {
            continue;
        }
        placements.push(PlacementDescriptor {
            id: PlacementId::new(),
            company_id,
            anchor: script,
            mode: EmbedMode::Script,
        });
    }
    placements
}

/// Claims every anchor carrying the widget class that has not been enhanced.
/// Anchors without a company id are marked and skipped.
pub fn scan_enhanced_placements(host: &dyn HostPage) -> Vec<PlacementDescriptor> {
    let mut placements = Vec::new();
    for anchor in host.elements_with_class(ENHANCED_CLASS) {
        if !claim(host, anchor, EmbedMode::Enhanced) {
            continue;
        }
        match host
            .attribute(anchor, COMPANY_ID_ATTR)
            .filter(|id| !id.trim().is_empty())
        {
            Some(company_id) => placements.push(PlacementDescriptor {
                id: PlacementId::new(),
                company_id,
                anchor,
                mode: EmbedMode::Enhanced,
            }),
            None => widget_warn!("widget anchor missing {} attribute", COMPANY_ID_ATTR),
        }
    }
    placements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryPage;

    #[test]
    fn script_scan_claims_each_tag_once() {
        let page = MemoryPage::new();
        let body = page.body();
        let first = page
            .append_element(body, "script", &[("src", "https://cdn.example/widget.js"), (COMPANY_ID_ATTR, "acme")], "")
            .unwrap();
        page.append_element(body, "script", &[("src", "/app.js"), (COMPANY_ID_ATTR, "other")], "")
            .unwrap();
        page.append_element(body, "script", &[("src", "/widget.js")], "").unwrap();
        page.set_current_script(Some(first));

        let placements = scan_script_placements(&page);
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].company_id, "acme");
        assert!(placements[0].is_processed(&page));

        assert!(scan_script_placements(&page).is_empty());
    }

    #[test]
    fn enhanced_scan_skips_anchor_without_company() {
        let page = MemoryPage::new();
        let body = page.body();
        page.append_element(body, "a", &[("class", ENHANCED_CLASS), (COMPANY_ID_ATTR, "acme")], "Apply Now")
            .unwrap();
        let orphan = page
            .append_element(body, "a", &[("class", ENHANCED_CLASS)], "Apply Now")
            .unwrap();

        let placements = scan_enhanced_placements(&page);
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].mode, EmbedMode::Enhanced);
        assert_eq!(page.attribute(orphan, ENHANCED_PROCESSED_ATTR).as_deref(), Some("true"));
        assert!(scan_enhanced_placements(&page).is_empty());
    }
}
