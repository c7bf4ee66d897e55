use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_BG_COLOR, DEFAULT_TEXT_COLOR};

const SERVER_DEFAULT_TEXT: &str = "Chat with us";
const SERVER_DEFAULT_SHAPE: &str = "rounded";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CompanyStatus {
    #[default]
    Active,
    Archived,
}

/// A company as registered by the admin console.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    pub public_id: String,
    #[serde(default)]
    pub status: CompanyStatus,
    pub website_url: Option<String>,
    pub chat_button_text: Option<String>,
    pub chat_button_bg_color: Option<String>,
    pub chat_button_text_color: Option<String>,
    pub chat_button_shape: Option<String>,
}

/// Body of a successful config response. Unset or empty columns get the
/// server-side defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfigBody {
    pub button_text: String,
    pub bg_color: String,
    pub text_color: String,
    pub shape: String,
}

fn or_default(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

impl CompanyRecord {
    pub fn widget_config(&self) -> WidgetConfigBody {
        WidgetConfigBody {
            button_text: or_default(&self.chat_button_text, SERVER_DEFAULT_TEXT),
            bg_color: or_default(&self.chat_button_bg_color, DEFAULT_BG_COLOR),
            text_color: or_default(&self.chat_button_text_color, DEFAULT_TEXT_COLOR),
            shape: or_default(&self.chat_button_shape, SERVER_DEFAULT_SHAPE),
        }
    }
}

/// Companies keyed by public id.
#[derive(Debug, Clone, Default)]
pub struct CompanyDirectory {
    companies: HashMap<String, CompanyRecord>,
}

impl CompanyDirectory {
    pub fn from_records(records: Vec<CompanyRecord>) -> Self {
        Self {
            companies: records
                .into_iter()
                .map(|record| (record.public_id.to_ascii_lowercase(), record))
                .collect(),
        }
    }

    /// Reads a JSON array of company records.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read company directory {}", path.display()))?;
        let records: Vec<CompanyRecord> = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid company directory in {}", path.display()))?;
        Ok(Self::from_records(records))
    }

    /// Public ids are UUIDs, so lookup ignores case.
    pub fn find_active(&self, public_id: &str) -> Option<&CompanyRecord> {
        self.companies
            .get(&public_id.trim().to_ascii_lowercase())
            .filter(|record| record.status == CompanyStatus::Active)
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> CompanyRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn empty_columns_use_server_defaults() {
        let company = record(
            r#"{ "publicId": "A1", "websiteUrl": "https://acme.com", "chatButtonText": "", "chatButtonShape": "pill" }"#,
        );
        assert_eq!(
            company.widget_config(),
            WidgetConfigBody {
                button_text: "Chat with us".into(),
                bg_color: "#000000".into(),
                text_color: "#ffffff".into(),
                shape: "pill".into(),
            }
        );
    }

    #[test]
    fn archived_companies_are_not_served() {
        let directory = CompanyDirectory::from_records(vec![
            record(r#"{ "publicId": "live", "websiteUrl": null }"#),
            record(r#"{ "publicId": "gone", "status": "archived", "websiteUrl": null }"#),
        ]);
        assert!(directory.find_active("LIVE").is_some());
        assert!(directory.find_active("gone").is_none());
        assert!(directory.find_active("missing").is_none());
        assert_eq!(directory.len(), 2);
    }
}
