use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::wire::{id_string, ChatTurn};

pub mod memory;
pub mod supabase;

pub const LOGO_BUCKET: &str = "brand-assets";
pub const IMAGE_BUCKET: &str = "project_assets";
pub const MAX_PALETTE: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub html_code: Option<String>,
    #[serde(default)]
    pub latest_code: Option<String>,
    #[serde(default)]
    pub chat_history: Option<Vec<ChatTurn>>,
    #[serde(default)]
    pub design_summary: Option<String>,
    #[serde(default)]
    pub component_list: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Code the assistant should keep editing: the last generated version,
    /// falling back to what the user saved.
    pub fn working_code(&self) -> Option<&str> {
        self.latest_code
            .as_deref()
            .or(self.html_code.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_code: Option<String>,
}

impl From<&Project> for ProjectSummary {
    fn from(p: &Project) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            created_at: p.created_at,
            html_code: p.html_code.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewProject {
    pub user_id: String,
    pub name: String,
    pub html_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_history: Option<Vec<ChatTurn>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectContext {
    pub code: Option<String>,
    pub rule_targets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodeUpdate {
    pub latest_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontPair {
    #[serde(alias = "headline")]
    pub heading: String,
    pub body: String,
}

impl FontPair {
    pub fn is_complete(&self) -> bool {
        !self.heading.trim().is_empty() && !self.body.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoVariant {
    Light,
    Dark,
}

impl LogoVariant {
    pub fn column(self) -> &'static str {
        match self {
            LogoVariant::Light => "logo_url_light",
            LogoVariant::Dark => "logo_url_dark",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            LogoVariant::Light => "light",
            LogoVariant::Dark => "dark",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "light" => Some(LogoVariant::Light),
            "dark" => Some(LogoVariant::Dark),
            _ => None,
        }
    }
}

/// A row of `brand_assets`. Unset fields are left alone by an upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandAssets {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_palette: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_pair: Option<FontPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url_light: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url_dark: Option<String>,
}

impl BrandAssets {
    pub fn for_user(user_id: &str) -> Self {
        Self { user_id: user_id.to_string(), ..Default::default() }
    }

    pub fn logo(&self, variant: LogoVariant) -> Option<&str> {
        match variant {
            LogoVariant::Light => self.logo_url_light.as_deref(),
            LogoVariant::Dark => self.logo_url_dark.as_deref(),
        }
    }

    pub fn with_logo(mut self, variant: LogoVariant, url: String) -> Self {
        match variant {
            LogoVariant::Light => self.logo_url_light = Some(url),
            LogoVariant::Dark => self.logo_url_dark = Some(url),
        }
        self
    }

    pub fn merge(&mut self, patch: &BrandAssets) {
        if patch.color_palette.is_some() {
            self.color_palette = patch.color_palette.clone();
        }
        if patch.font_pair.is_some() {
            self.font_pair = patch.font_pair.clone();
        }
        if patch.logo_url_light.is_some() {
            self.logo_url_light = patch.logo_url_light.clone();
        }
        if patch.logo_url_dark.is_some() {
            self.logo_url_dark = patch.logo_url_dark.clone();
        }
    }
}

/// Listing shape; the embedding never leaves the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewKnowledgeChunk {
    pub user_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingRule {
    #[serde(deserialize_with = "id_string")]
    pub project_id: String,
    pub user_id: String,
    pub target_element_id: String,
    #[serde(default)]
    pub original_content: Option<String>,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub subscription_tier: Option<String>,
    #[serde(default)]
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interaction_count: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Working code and enabled rule targets; `None` unless `user_id` owns the project.
    async fn project_context(&self, user_id: &str, project_id: &str) -> Result<Option<ProjectContext>>;
    async fn save_generated_code(&self, user_id: &str, project_id: &str, update: &CodeUpdate) -> Result<()>;
    async fn owns_project(&self, user_id: &str, project_id: &str) -> Result<bool>;

    async fn insert_project(&self, project: &NewProject) -> Result<Project>;
    async fn list_projects(&self, user_id: &str) -> Result<Vec<ProjectSummary>>;
    async fn delete_project(&self, user_id: &str, project_id: &str) -> Result<()>;

    async fn increment_interactions(&self, user_id: &str) -> Result<()>;
    async fn start_trial(&self, user_id: &str, ends_at: DateTime<Utc>) -> Result<Option<Profile>>;

    async fn brand_assets(&self, user_id: &str) -> Result<Option<BrandAssets>>;
    async fn upsert_brand_assets(&self, patch: &BrandAssets) -> Result<()>;
    async fn clear_logo(&self, user_id: &str, variant: LogoVariant) -> Result<()>;

    async fn insert_chunks(&self, chunks: &[NewKnowledgeChunk]) -> Result<()>;
    async fn list_chunks(&self, user_id: &str) -> Result<Vec<KnowledgeChunk>>;
    async fn delete_chunk(&self, user_id: &str, chunk_id: &str) -> Result<()>;

    async fn marketing_rule(
        &self,
        user_id: &str,
        project_id: &str,
        target_element_id: &str,
    ) -> Result<Option<MarketingRule>>;
    /// Inserts the rule, or updates the one `rule.user_id` already has for the
    /// same project and element. Never reassigns another user's row.
    async fn upsert_marketing_rule(&self, rule: &MarketingRule) -> Result<()>;

    async fn list_inspiration(&self) -> Result<Vec<Value>>;
}

#[async_trait]
pub trait Blobs: Send + Sync {
    /// Stores `bytes` and returns the object path inside the bucket.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> Result<String>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()>;
}

pub type DynStore = Arc<dyn Store>;
pub type DynBlobs = Arc<dyn Blobs>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn font_pair_accepts_headline_alias() {
        let fp: FontPair = serde_json::from_value(json!({"headline": "Playfair Display", "body": "Inter"})).unwrap();
        assert_eq!(fp.heading, "Playfair Display");
        assert!(fp.is_complete());
        assert!(!FontPair { heading: " ".into(), body: "Inter".into() }.is_complete());
    }

    #[test]
    fn brand_patch_only_serializes_set_fields() {
        let patch = BrandAssets::for_user("u1").with_logo(LogoVariant::Dark, "https://x/y.png".into());
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"user_id": "u1", "logo_url_dark": "https://x/y.png"})
        );
    }

    #[test]
    fn merge_keeps_unset_fields() {
        let mut row = BrandAssets {
            color_palette: Some(vec!["#000".into()]),
            ..BrandAssets::for_user("u1")
        };
        row.merge(&BrandAssets::for_user("u1").with_logo(LogoVariant::Light, "l".into()));
        assert_eq!(row.color_palette, Some(vec!["#000".to_string()]));
        assert_eq!(row.logo(LogoVariant::Light), Some("l"));
    }

    #[test]
    fn working_code_prefers_latest() {
        let mut p: Project = serde_json::from_value(json!({
            "id": 7, "user_id": "u", "name": "n", "html_code": "<saved/>", "latest_code": null
        }))
        .unwrap();
        assert_eq!(p.id, "7");
        assert_eq!(p.working_code(), Some("<saved/>"));
        p.latest_code = Some("<generated/>".into());
        assert_eq!(p.working_code(), Some("<generated/>"));
    }
}
