//! Display configuration for a widget control.
//!
//! The remote endpoint returns loosely-typed JSON. [`RemoteConfig`] captures
//! what was actually usable and [`RemoteConfig::resolve`] is the single rule
//! for substituting defaults field by field.

pub mod fetcher;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use fetcher::{ConfigSource, FetchError, HttpConfigFetcher};

pub const DEFAULT_BG_COLOR: &str = "#000000";
pub const DEFAULT_TEXT_COLOR: &str = "#ffffff";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ButtonShape {
    Square,
    #[default]
    Rounded,
    Pill,
}

impl ButtonShape {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "square" => Some(ButtonShape::Square),
            "rounded" => Some(ButtonShape::Rounded),
            "pill" => Some(ButtonShape::Pill),
            _ => None,
        }
    }

    pub fn border_radius(self) -> &'static str {
        match self {
            ButtonShape::Square => "0px",
            ButtonShape::Rounded => "6px",
            ButtonShape::Pill => "999px",
        }
    }
}

/// How the widget reaches the page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EmbedMode {
    /// A script tag that inserts its own control next to itself.
    Script,
    /// A pre-rendered anchor progressively enhanced in place.
    Enhanced,
}

impl EmbedMode {
    pub fn default_button_text(self) -> &'static str {
        match self {
            EmbedMode::Script => "Apply Now!",
            EmbedMode::Enhanced => "Chat with us",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    pub button_text: String,
    pub bg_color: String,
    pub text_color: String,
    pub shape: ButtonShape,
}

impl WidgetConfig {
    pub fn defaults(mode: EmbedMode) -> Self {
        Self {
            button_text: mode.default_button_text().to_string(),
            bg_color: DEFAULT_BG_COLOR.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            shape: ButtonShape::default(),
        }
    }
}

/// Fields the endpoint supplied in a usable form. `None` means absent or unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    pub button_text: Option<String>,
    pub bg_color: Option<String>,
    pub text_color: Option<String>,
    pub shape: Option<ButtonShape>,
}

impl RemoteConfig {
    /// Reads a response body. Only a body that is not a JSON object is an
    /// error; wrongly-typed or unrecognised fields are treated as absent.
    pub fn from_json(body: &Value) -> Option<Self> {
        let object = body.as_object()?;
        let text_field = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Some(Self {
            button_text: text_field("buttonText"),
            bg_color: text_field("bgColor").filter(|c| is_hex_color(c)),
            text_color: text_field("textColor").filter(|c| is_hex_color(c)),
            shape: text_field("shape").and_then(|s| ButtonShape::parse(&s)),
        })
    }

    pub fn resolve(&self, mode: EmbedMode) -> WidgetConfig {
        let defaults = WidgetConfig::defaults(mode);
        WidgetConfig {
            button_text: self.button_text.clone().unwrap_or(defaults.button_text),
            bg_color: self.bg_color.clone().unwrap_or(defaults.bg_color),
            text_color: self.text_color.clone().unwrap_or(defaults.text_color),
            shape: self.shape.unwrap_or(defaults.shape),
        }
    }
}

pub fn is_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Shifts every channel of a hex colour by `amount`, clamped to 0..=255.
/// Three-digit colours are expanded and returned unshifted.
pub fn adjust_brightness(color: &str, amount: i32) -> String {
    let digits = color.strip_prefix('#').unwrap_or(color);
    if digits.len() == 3 {
        let expanded: String = digits.chars().flat_map(|c| [c, c]).collect();
        return format!("#{expanded}");
    }
    let Ok(value) = u32::from_str_radix(digits, 16) else {
        return color.to_string();
    };
    let shift = |channel: u32| (channel as i32 + amount).clamp(0, 255) as u32;
    let r = shift((value >> 16) & 0xff);
    let g = shift((value >> 8) & 0xff);
    let b = shift(value & 0xff);
    format!("#{:06x}", (r << 16) | (g << 8) | b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shape_only_changes_border_radius() {
        let remote = RemoteConfig::from_json(&json!({ "shape": "pill" })).unwrap();
        let resolved = remote.resolve(EmbedMode::Script);
        let defaults = WidgetConfig::defaults(EmbedMode::Script);

        assert_eq!(resolved.shape.border_radius(), "999px");
        assert_eq!(resolved.button_text, defaults.button_text);
        assert_eq!(resolved.bg_color, defaults.bg_color);
        assert_eq!(resolved.text_color, defaults.text_color);
    }

    #[test]
    fn unusable_fields_fall_back_individually() {
        let remote = RemoteConfig::from_json(&json!({
            "buttonText": "  ",
            "bgColor": "red; background: url(x)",
            "textColor": "#abc",
            "shape": "hexagon",
        }))
        .unwrap();

        assert_eq!(
            remote.resolve(EmbedMode::Enhanced),
            WidgetConfig {
                button_text: "Chat with us".into(),
                bg_color: DEFAULT_BG_COLOR.into(),
                text_color: "#abc".into(),
                shape: ButtonShape::Rounded,
            }
        );
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(RemoteConfig::from_json(&json!(["buttonText"])).is_none());
        assert!(RemoteConfig::from_json(&json!("Apply")).is_none());
    }

    #[test]
    fn default_text_depends_on_embed_mode() {
        assert_eq!(WidgetConfig::defaults(EmbedMode::Script).button_text, "Apply Now!");
        assert_eq!(
            WidgetConfig::defaults(EmbedMode::Enhanced).button_text,
            "Chat with us"
        );
    }

    #[test]
    fn brightness_clamps_each_channel() {
        assert_eq!(adjust_brightness("#102030", -20), "#000c1c");
        assert_eq!(adjust_brightness("#fffff0", 20), "#ffffff");
        assert_eq!(adjust_brightness("#abc", -20), "#aabbcc");
    }
}
