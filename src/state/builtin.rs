//! Settings every deployment has.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::definition::StateDefinition;
use super::error::ValidationError;
use super::ScopeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    EnUs,
    ZhCn,
    ZhTw,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::EnUs, Language::ZhCn, Language::ZhTw];

    pub fn id(&self) -> &'static str {
        match self {
            Language::EnUs => "en_us",
            Language::ZhCn => "zh_cn",
            Language::ZhTw => "zh_tw",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::EnUs => "English (US)",
            Language::ZhCn => "简体中文（中国大陆）",
            Language::ZhTw => "繁體中文（台灣）",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = ValidationError;

    /// Case-insensitive; `zh-cn` and `zh_cn` are the same.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().to_ascii_lowercase().replace('-', "_");
        Language::ALL
            .into_iter()
            .find(|lang| lang.id() == id)
            .ok_or_else(|| {
                ValidationError::new(format!(
                    "Unsupported language '{}'. Choose one of: en_us, zh_cn, zh_tw",
                    s.trim()
                ))
            })
    }
}

/// Reply language. Settable anywhere, written per user by default.
pub struct LanguagePref {
    default: Language,
}

impl LanguagePref {
    pub fn new(default: Language) -> Self {
        Self { default }
    }
}

impl StateDefinition for LanguagePref {
    type Value = Language;

    fn name(&self) -> &str {
        "lang"
    }

    fn description(&self) -> &str {
        "Reply language"
    }

    fn allowed_scopes(&self) -> &[ScopeType] {
        &[ScopeType::Global, ScopeType::User, ScopeType::Chat]
    }

    fn preferred_scope(&self) -> ScopeType {
        ScopeType::User
    }

    fn default_value(&self) -> Language {
        self.default
    }

    fn parse(&self, raw: &str) -> Result<Language, ValidationError> {
        raw.parse()
    }

    fn format(&self, value: &Language) -> String {
        format!("{} ({})", value.id(), value.display_name())
    }

    fn suggest_values(&self) -> Vec<String> {
        Language::ALL.iter().map(|l| l.id().to_string()).collect()
    }
}

const STATUS_MAX_CHARS: usize = 64;

/// Short personal status such as "busy". Expires after two hours.
pub struct StatusPref;

impl StateDefinition for StatusPref {
    type Value = String;

    fn name(&self) -> &str {
        "status"
    }

    fn description(&self) -> &str {
        "Your current status (expires after 2 hours)"
    }

    fn allowed_scopes(&self) -> &[ScopeType] {
        &[ScopeType::User]
    }

    fn preferred_scope(&self) -> ScopeType {
        ScopeType::User
    }

    fn default_value(&self) -> String {
        "available".to_string()
    }

    fn parse(&self, raw: &str) -> Result<String, ValidationError> {
        Ok(raw.trim().to_string())
    }

    fn validate(&self, value: &String) -> Result<(), ValidationError> {
        if value.is_empty() {
            return Err(ValidationError::new("Status must not be empty"));
        }
        if value.chars().count() > STATUS_MAX_CHARS {
            return Err(ValidationError::new(format!(
                "Status must be at most {} characters",
                STATUS_MAX_CHARS
            )));
        }
        Ok(())
    }

    fn format(&self, value: &String) -> String {
        value.clone()
    }

    fn suggest_values(&self) -> Vec<String> {
        vec!["available".into(), "busy".into(), "away".into()]
    }

    fn ttl(&self) -> Option<Duration> {
        Some(Duration::hours(2))
    }
}
