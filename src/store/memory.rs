//! Process-local store used for development without Supabase and in tests.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

use super::{
    BrandAssets, Blobs, CodeUpdate, KnowledgeChunk, LogoVariant, MarketingRule, NewKnowledgeChunk,
    NewProject, Profile, Project, ProjectContext, ProjectSummary, Store,
};

struct StoredChunk {
    user_id: String,
    chunk: KnowledgeChunk,
}

#[derive(Default)]
struct Tables {
    next_id: u64,
    projects: Vec<Project>,
    chunks: Vec<StoredChunk>,
    brand: HashMap<String, BrandAssets>,
    rules: Vec<MarketingRule>,
    profiles: HashMap<String, Profile>,
    inspiration: Vec<Value>,
    objects: HashMap<(String, String), Bytes>,
}

impl Tables {
    fn id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn profile(&mut self, user_id: &str) -> &mut Profile {
        self.profiles.entry(user_id.to_string()).or_insert_with(|| Profile {
            id: user_id.to_string(),
            subscription_tier: None,
            trial_ends_at: None,
            interaction_count: 0,
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_inspiration(items: Vec<Value>) -> Self {
        let store = Self::default();
        store.tables.lock().inspiration = items;
        store
    }

    pub fn project(&self, project_id: &str) -> Option<Project> {
        self.tables.lock().projects.iter().find(|p| p.id == project_id).cloned()
    }

    pub fn profile(&self, user_id: &str) -> Option<Profile> {
        self.tables.lock().profiles.get(user_id).cloned()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<Bytes> {
        self.tables.lock().objects.get(&(bucket.to_string(), path.to_string())).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn project_context(&self, user_id: &str, project_id: &str) -> Result<Option<ProjectContext>> {
        let t = self.tables.lock();
        let Some(project) = t.projects.iter().find(|p| p.id == project_id && p.user_id == user_id) else {
            return Ok(None);
        };
        let rule_targets = t
            .rules
            .iter()
            .filter(|r| r.project_id == project_id && r.user_id == user_id && r.is_enabled)
            .map(|r| r.target_element_id.clone())
            .collect();
        Ok(Some(ProjectContext { code: project.working_code().map(str::to_string), rule_targets }))
    }

    async fn save_generated_code(&self, user_id: &str, project_id: &str, update: &CodeUpdate) -> Result<()> {
        let mut t = self.tables.lock();
        if let Some(p) = t.projects.iter_mut().find(|p| p.id == project_id && p.user_id == user_id) {
            p.latest_code = Some(update.latest_code.clone());
            if update.design_summary.is_some() {
                p.design_summary = update.design_summary.clone();
            }
            if update.component_list.is_some() {
                p.component_list = update.component_list.clone();
            }
        }
        Ok(())
    }

    async fn owns_project(&self, user_id: &str, project_id: &str) -> Result<bool> {
        Ok(self.tables.lock().projects.iter().any(|p| p.id == project_id && p.user_id == user_id))
    }

    async fn insert_project(&self, project: &NewProject) -> Result<Project> {
        let mut t = self.tables.lock();
        let row = Project {
            id: t.id(),
            user_id: project.user_id.clone(),
            name: project.name.clone(),
            html_code: Some(project.html_code.clone()),
            latest_code: None,
            chat_history: project.chat_history.clone(),
            design_summary: None,
            component_list: None,
            created_at: Some(Utc::now()),
        };
        t.projects.push(row.clone());
        Ok(row)
    }

    async fn list_projects(&self, user_id: &str) -> Result<Vec<ProjectSummary>> {
        let t = self.tables.lock();
        Ok(t.projects
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .map(ProjectSummary::from)
            .collect())
    }

    async fn delete_project(&self, user_id: &str, project_id: &str) -> Result<()> {
        self.tables
            .lock()
            .projects
            .retain(|p| !(p.id == project_id && p.user_id == user_id));
        Ok(())
    }

    async fn increment_interactions(&self, user_id: &str) -> Result<()> {
        self.tables.lock().profile(user_id).interaction_count += 1;
        Ok(())
    }

    async fn start_trial(&self, user_id: &str, ends_at: DateTime<Utc>) -> Result<Option<Profile>> {
        let mut t = self.tables.lock();
        let profile = t.profile(user_id);
        profile.trial_ends_at = Some(ends_at);
        Ok(Some(profile.clone()))
    }

    async fn brand_assets(&self, user_id: &str) -> Result<Option<BrandAssets>> {
        Ok(self.tables.lock().brand.get(user_id).cloned())
    }

    async fn upsert_brand_assets(&self, patch: &BrandAssets) -> Result<()> {
        self.tables
            .lock()
            .brand
            .entry(patch.user_id.clone())
            .or_insert_with(|| BrandAssets::for_user(&patch.user_id))
            .merge(patch);
        Ok(())
    }

    async fn clear_logo(&self, user_id: &str, variant: LogoVariant) -> Result<()> {
        if let Some(row) = self.tables.lock().brand.get_mut(user_id) {
            match variant {
                LogoVariant::Light => row.logo_url_light = None,
                LogoVariant::Dark => row.logo_url_dark = None,
            }
        }
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[NewKnowledgeChunk]) -> Result<()> {
        let mut t = self.tables.lock();
        for c in chunks {
            let id = t.id();
            t.chunks.push(StoredChunk {
                user_id: c.user_id.clone(),
                chunk: KnowledgeChunk { id, content: c.content.clone(), created_at: Some(Utc::now()) },
            });
        }
        Ok(())
    }

    async fn list_chunks(&self, user_id: &str) -> Result<Vec<KnowledgeChunk>> {
        let t = self.tables.lock();
        Ok(t.chunks
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.chunk.clone())
            .collect())
    }

    async fn delete_chunk(&self, user_id: &str, chunk_id: &str) -> Result<()> {
        self.tables
            .lock()
            .chunks
            .retain(|c| !(c.chunk.id == chunk_id && c.user_id == user_id));
        Ok(())
    }

    async fn marketing_rule(
        &self,
        user_id: &str,
        project_id: &str,
        target_element_id: &str,
    ) -> Result<Option<MarketingRule>> {
        Ok(self
            .tables
            .lock()
            .rules
            .iter()
            .find(|r| {
                r.user_id == user_id
                    && r.project_id == project_id
                    && r.target_element_id == target_element_id
            })
            .cloned())
    }

    async fn upsert_marketing_rule(&self, rule: &MarketingRule) -> Result<()> {
        let mut t = self.tables.lock();
        match t.rules.iter_mut().find(|r| {
            r.project_id == rule.project_id && r.target_element_id == rule.target_element_id
        }) {
            Some(existing) if existing.user_id != rule.user_id => {
                bail!("rule for {} on project {} belongs to another user", rule.target_element_id, rule.project_id)
            }
            Some(existing) => *existing = rule.clone(),
            None => t.rules.push(rule.clone()),
        }
        Ok(())
    }

    async fn list_inspiration(&self) -> Result<Vec<Value>> {
        Ok(self.tables.lock().inspiration.clone())
    }
}

#[async_trait]
impl Blobs for MemoryStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        _content_type: &str,
        upsert: bool,
    ) -> Result<String> {
        let mut t = self.tables.lock();
        let key = (bucket.to_string(), path.to_string());
        if !upsert && t.objects.contains_key(&key) {
            return Err(anyhow!("object {bucket}/{path} already exists"));
        }
        t.objects.insert(key, bytes);
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        let mut t = self.tables.lock();
        for p in paths {
            t.objects.remove(&(bucket.to_string(), p.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(user: &str, content: &str) -> NewKnowledgeChunk {
        NewKnowledgeChunk { user_id: user.into(), content: content.into(), embedding: vec![0.1, 0.2] }
    }

    #[tokio::test]
    async fn cross_user_chunk_delete_is_a_no_op() {
        let store = MemoryStore::new();
        store.insert_chunks(&[chunk("alice", "a1"), chunk("bob", "b1")]).await.unwrap();
        let bobs = store.list_chunks("bob").await.unwrap();

        store.delete_chunk("alice", &bobs[0].id).await.unwrap();
        assert_eq!(store.list_chunks("bob").await.unwrap().len(), 1);

        store.delete_chunk("bob", &bobs[0].id).await.unwrap();
        assert!(store.list_chunks("bob").await.unwrap().is_empty());
        assert_eq!(store.list_chunks("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn project_delete_is_owner_scoped() {
        let store = MemoryStore::new();
        let p = store
            .insert_project(&NewProject {
                user_id: "alice".into(),
                name: "Site".into(),
                html_code: "<p/>".into(),
                chat_history: None,
            })
            .await
            .unwrap();

        store.delete_project("mallory", &p.id).await.unwrap();
        assert_eq!(store.list_projects("alice").await.unwrap().len(), 1);
        store.delete_project("alice", &p.id).await.unwrap();
        assert!(store.list_projects("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_only_lists_enabled_rules() {
        let store = MemoryStore::new();
        let p = store
            .insert_project(&NewProject {
                user_id: "u".into(),
                name: "n".into(),
                html_code: "<h1 id=\"a\">x</h1>".into(),
                chat_history: None,
            })
            .await
            .unwrap();
        for (target, on) in [("a", true), ("b", false)] {
            store
                .upsert_marketing_rule(&MarketingRule {
                    project_id: p.id.clone(),
                    user_id: "u".into(),
                    target_element_id: target.into(),
                    original_content: None,
                    is_enabled: on,
                })
                .await
                .unwrap();
        }

        let ctx = store.project_context("u", &p.id).await.unwrap().unwrap();
        assert_eq!(ctx.rule_targets, vec!["a".to_string()]);
        assert_eq!(ctx.code.as_deref(), Some("<h1 id=\"a\">x</h1>"));
        assert!(store.project_context("u", "missing").await.unwrap().is_none());
        assert!(store.project_context("other", &p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upload_without_upsert_refuses_overwrite() {
        let store = MemoryStore::new();
        let body = Bytes::from_static(b"png");
        store.upload("project_assets", "u/x.png", body.clone(), "image/png", false).await.unwrap();
        assert!(store.upload("project_assets", "u/x.png", body.clone(), "image/png", false).await.is_err());
        assert!(store.upload("project_assets", "u/x.png", body, "image/png", true).await.is_ok());
    }
}
