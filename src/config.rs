use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::BehaviorType;

pub const DEFAULT_CONFIG_FILE: &str = "behavior.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub school_name: String,
    /// When false, dispatch only logs what would have been sent.
    pub send_emails: bool,
    /// Kept for configuration compatibility; keyword matching does not use it.
    pub similarity_threshold: u32,
    pub max_suggestions: usize,
    /// Pause between sends during batch runs.
    pub send_delay_ms: u64,
    pub subjects: Subjects,
    pub admin_emails: AdminEmails,
    pub mail: MailSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Subjects {
    pub good_news: String,
    pub stop_and_think: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminEmails {
    pub principal: String,
    pub associate_principal: String,
    pub academic_support: String,
    pub tech_support: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub relay_url: Option<String>,
    pub relay_token_env: String,
    pub outbox_dir: PathBuf,
    pub system_address: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            school_name: "Lakeside Middle School".to_string(),
            send_emails: true,
            similarity_threshold: 3,
            max_suggestions: 5,
            send_delay_ms: 1000,
            subjects: Subjects::default(),
            admin_emails: AdminEmails::default(),
            mail: MailSettings::default(),
        }
    }
}

impl Default for Subjects {
    fn default() -> Self {
        Self {
            good_news: "Good News Moment - Demonstrating Character!".to_string(),
            stop_and_think: "Stop & Think Moment - Opportunity for Growth".to_string(),
        }
    }
}

impl Default for AdminEmails {
    fn default() -> Self {
        Self {
            principal: "principal@school.example.org".to_string(),
            associate_principal: "associate.principal@school.example.org".to_string(),
            academic_support: "academic.support@school.example.org".to_string(),
            tech_support: "tech.support@school.example.org".to_string(),
        }
    }
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            relay_url: None,
            relay_token_env: "MAIL_RELAY_TOKEN".to_string(),
            outbox_dir: PathBuf::from("outbox"),
            system_address: "behavior-system@school.example.org".to_string(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`, or from `behavior.toml` in the working
    /// directory when present, or falls back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn subject_for(&self, behavior_type: BehaviorType) -> &str {
        match behavior_type {
            BehaviorType::GoodNews => &self.subjects.good_news,
            BehaviorType::StopAndThink => &self.subjects.stop_and_think,
        }
    }

    pub fn relay_token(&self) -> Option<String> {
        std::env::var(&self.mail.relay_token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let settings = Settings::parse(
            r#"
            school_name = "Northfield Middle"
            send_emails = false

            [subjects]
            good_news = "Great day!"

            [mail]
            relay_url = "https://relay.example.org/send"
            "#,
        )
        .expect("settings should parse");

        assert_eq!(settings.school_name, "Northfield Middle");
        assert!(!settings.send_emails);
        assert_eq!(settings.subject_for(BehaviorType::GoodNews), "Great day!");
        assert_eq!(
            settings.subject_for(BehaviorType::StopAndThink),
            Subjects::default().stop_and_think
        );
        assert_eq!(settings.send_delay_ms, 1000);
        assert_eq!(settings.mail.outbox_dir, PathBuf::from("outbox"));
        assert_eq!(
            settings.mail.relay_url.as_deref(),
            Some("https://relay.example.org/send")
        );
    }

    #[test]
    fn rejects_mistyped_values() {
        assert!(Settings::parse("send_emails = \"sometimes\"").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("behavior.toml");
        std::fs::write(&path, "send_delay_ms = 0\n").expect("write settings");
        let settings = Settings::load(Some(&path)).expect("settings should load");
        assert_eq!(settings.send_delay_ms, 0);
        assert!(settings.send_emails);
    }
}
