//! Builds the call-to-action control for a placement.

use std::sync::Arc;

use crate::config::{adjust_brightness, EmbedMode, RemoteConfig, WidgetConfig};
use crate::host::{
    apply_styles, ElementId, EventKind, HostError, HostEvent, HostPage, ListenerTarget,
    Propagation,
};
use crate::modal::ModalController;
use crate::placement::PlacementDescriptor;
use crate::style::BUTTON_CLASS;

pub const WIDGET_MARKER_ATTR: &str = "data-ondework-widget";

/// Anchor labels that a configured button text is allowed to replace.
const STOCK_LABELS: [&str; 4] = ["Apply Now - Live Chat!", "Apply Now", "Chat with us", ""];

/// Styling an enhanced anchor gets before its configuration arrives, so it
/// reads as a button even if the fetch never succeeds.
pub fn apply_enhanced_defaults(host: &dyn HostPage, anchor: ElementId) -> Result<(), HostError> {
    let defaults = WidgetConfig::defaults(EmbedMode::Enhanced);
    apply_styles(
        host,
        anchor,
        &[
            ("display", "inline-block"),
            ("padding", "12px 20px"),
            ("background-color", defaults.bg_color.as_str()),
            ("color", defaults.text_color.as_str()),
            ("text-decoration", "none"),
            ("border", "none"),
            ("border-radius", defaults.shape.border_radius()),
            ("font-size", "14px"),
            ("font-weight", "bold"),
            ("cursor", "pointer"),
            ("box-shadow", "0 2px 8px rgba(0,0,0,0.2)"),
            ("transition", "transform 0.2s ease, background-color 0.2s ease"),
            ("margin-top", "16px"),
            ("font-family", "inherit"),
            ("line-height", "1.2"),
            ("vertical-align", "middle"),
        ],
    )
}

/// Creates or enhances the control for `placement` and wires activation to
/// the modal. `remote` is `None` when the configuration fetch failed.
pub fn mount_control(
    host: &Arc<dyn HostPage>,
    placement: &PlacementDescriptor,
    remote: Option<&RemoteConfig>,
    modals: &ModalController,
) -> Result<ElementId, HostError> {
    let control = match placement.mode {
        EmbedMode::Script => insert_button(host.as_ref(), placement, remote)?,
        EmbedMode::Enhanced => enhance_anchor(host, placement, remote)?,
    };

    let modals = modals.clone();
    let company_id = placement.company_id.clone();
    host.add_listener(
        ListenerTarget::Element(control),
        EventKind::Click,
        Arc::new(move |_: &HostEvent| {
            modals.activate(&company_id);
            Propagation::PreventDefault
        }),
    );
    Ok(control)
}

fn insert_button(
    host: &dyn HostPage,
    placement: &PlacementDescriptor,
    remote: Option<&RemoteConfig>,
) -> Result<ElementId, HostError> {
    let config = remote.cloned().unwrap_or_default().resolve(placement.mode);

    let button = host.create_element("button");
    host.set_attribute(button, "class", BUTTON_CLASS)?;
    host.set_attribute(button, WIDGET_MARKER_ATTR, &placement.company_id)?;
    host.set_text(button, &config.button_text)?;
    apply_styles(
        host,
        button,
        &[
            ("background-color", config.bg_color.as_str()),
            ("color", config.text_color.as_str()),
            ("border-radius", config.shape.border_radius()),
        ],
    )?;
    host.insert_after(placement.anchor, button)?;
    Ok(button)
}

fn enhance_anchor(
    host: &Arc<dyn HostPage>,
    placement: &PlacementDescriptor,
    remote: Option<&RemoteConfig>,
) -> Result<ElementId, HostError> {
    let anchor = placement.anchor;
    let remote = remote.cloned().unwrap_or_default();
    let resolved = remote.resolve(placement.mode);

    if let Some(bg) = &remote.bg_color {
        host.set_style(anchor, "background-color", bg)?;
    }
    if let Some(color) = &remote.text_color {
        host.set_style(anchor, "color", color)?;
    }
    if let Some(shape) = remote.shape {
        host.set_style(anchor, "border-radius", shape.border_radius())?;
    }

    let current = host.text(anchor);
    let current = current.trim();
    if current.is_empty() || (remote.button_text.is_some() && STOCK_LABELS.contains(&current)) {
        host.set_text(anchor, &resolved.button_text)?;
    }

    // Listeners go on last: a failed write above leads to a retry, which
    // must not stack another pair.
    if let Some(bg) = &remote.bg_color {
        wire_hover(host, anchor, bg);
    }
    Ok(anchor)
}

fn wire_hover(host: &Arc<dyn HostPage>, anchor: ElementId, bg: &str) {
    let hover = adjust_brightness(bg, -20);
    for (kind, color) in [(EventKind::MouseEnter, hover), (EventKind::MouseLeave, bg.to_string())] {
        let page = Arc::downgrade(host);
        host.add_listener(
            ListenerTarget::Element(anchor),
            kind,
            Arc::new(move |_: &HostEvent| {
                if let Some(page) = page.upgrade() {
                    let _ = page.set_style(anchor, "background-color", &color);
                }
                Propagation::Continue
            }),
        );
    }
}
