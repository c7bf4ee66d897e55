use crate::config::EmbedMode;
use crate::host::HostPage;

pub const SCRIPT_STYLE_ID: &str = "ondework-widget-styles";
pub const ENHANCED_STYLE_ID: &str = "ondework-enhance-styles";

pub const BUTTON_CLASS: &str = "ondework-chat-button";
pub const ENHANCED_CLASS: &str = "ondework-widget";

const SCRIPT_CSS: &str = "
.ondework-chat-button {
  margin-top: 16px;
  padding: 12px 20px;
  font-size: 14px;
  font-weight: bold;
  cursor: pointer;
  border: none;
  border-radius: 8px;
  box-shadow: 0 2px 8px rgba(0,0,0,0.2);
  transition: transform 0.2s ease;
  display: inline-block;
}
.ondework-chat-button:hover {
  transform: scale(1.05);
}
";

const ENHANCED_CSS: &str = "
.ondework-widget {
  display: inline-block;
  padding: 12px 20px;
  background-color: #000;
  color: white;
  text-decoration: none !important;
  border: none;
  border-radius: 8px;
  font-size: 14px;
  font-weight: bold;
  cursor: pointer;
  box-shadow: 0 2px 8px rgba(0,0,0,0.2);
  transition: transform 0.2s ease, background-color 0.2s ease;
  margin-top: 16px;
  font-family: inherit;
  line-height: 1.2;
  vertical-align: middle;
}
.ondework-widget:hover {
  transform: scale(1.05);
  text-decoration: none !important;
}
.ondework-widget:focus {
  outline: 2px solid #007cba;
  outline-offset: 2px;
}
.ondework-widget:visited {
  color: inherit !important;
}
";

/// Installs the stylesheet for `mode` unless a block with its id already
/// exists. Returns true when a block was inserted.
pub fn ensure_styles(host: &dyn HostPage, mode: EmbedMode) -> bool {
    let (style_id, css) = match mode {
        EmbedMode::Script => (SCRIPT_STYLE_ID, SCRIPT_CSS),
        EmbedMode::Enhanced => (ENHANCED_STYLE_ID, ENHANCED_CSS),
    };
    if host.element_by_dom_id(style_id).is_some() {
        return false;
    }

    let style = host.create_element("style");
    let installed = host
        .set_attribute(style, "id", style_id)
        .and_then(|_| host.set_text(style, css))
        .and_then(|_| host.append_child(host.head(), style));
    installed.is_ok()
}
