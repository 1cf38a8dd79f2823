use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    BrandAssets, Blobs, CodeUpdate, KnowledgeChunk, LogoVariant, MarketingRule, NewKnowledgeChunk,
    NewProject, Profile, Project, ProjectContext, ProjectSummary, Store,
};

const RETURN_ROWS: &str = "return=representation";
const MERGE_DUPLICATES: &str = "resolution=merge-duplicates";

pub struct SupabaseStore {
    base: String,
    key: String,
    client: Client,
}

fn eq(v: &str) -> String {
    format!("eq.{v}")
}

/// Row filter for a project owned by `user_id`.
fn owned_project(user_id: &str, project_id: &str) -> [(&'static str, String); 2] {
    [("id", eq(project_id)), ("user_id", eq(user_id))]
}

/// Each segment is percent-encoded; the separators stay.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl SupabaseStore {
    pub fn new(base: String, service_key: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?;
        Ok(Self { base: base.trim_end_matches('/').to_string(), key: service_key, client })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base)
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{bucket}/{}", self.base, encode_path(path))
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.client.request(method, self.table_url(table))
    }

    async fn send(&self, rb: RequestBuilder, what: &str) -> Result<String> {
        let resp = rb
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .send()
            .await
            .with_context(|| format!("supabase {what} request failed"))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .with_context(|| format!("supabase {what}: reading body failed"))?;
        if !status.is_success() {
            return Err(anyhow!("supabase {what} error ({status}): {text}"));
        }
        tracing::debug!(%what, %status, "supabase ok");
        Ok(text)
    }

    async fn rows<T: DeserializeOwned>(&self, rb: RequestBuilder, what: &str) -> Result<Vec<T>> {
        let text = self.send(rb, what).await?;
        serde_json::from_str(&text).with_context(|| format!("supabase {what}: unexpected row shape"))
    }
}

#[derive(Deserialize)]
struct CodeColumns {
    #[serde(default)]
    latest_code: Option<String>,
    #[serde(default)]
    html_code: Option<String>,
}

#[derive(Deserialize)]
struct RuleTarget {
    target_element_id: String,
}

#[derive(Serialize)]
struct TrialUpdate {
    trial_ends_at: DateTime<Utc>,
}

#[async_trait]
impl Store for SupabaseStore {
    async fn project_context(&self, user_id: &str, project_id: &str) -> Result<Option<ProjectContext>> {
        let projects: Vec<CodeColumns> = self
            .rows(
                self.table(Method::GET, "projects")
                    .query(&[("select", "latest_code,html_code")])
                    .query(&owned_project(user_id, project_id)),
                "load project",
            )
            .await?;
        let Some(project) = projects.into_iter().next() else {
            return Ok(None);
        };

        let rules: Vec<RuleTarget> = self
            .rows(
                self.table(Method::GET, "live_marketing_rules").query(&[
                    ("select", "target_element_id"),
                    ("project_id", eq(project_id).as_str()),
                    ("user_id", eq(user_id).as_str()),
                    ("is_enabled", "eq.true"),
                ]),
                "load marketing rules",
            )
            .await?;

        let code = project.latest_code.or(project.html_code).filter(|c| !c.trim().is_empty());
        Ok(Some(ProjectContext {
            code,
            rule_targets: rules.into_iter().map(|r| r.target_element_id).collect(),
        }))
    }

    async fn save_generated_code(&self, user_id: &str, project_id: &str, update: &CodeUpdate) -> Result<()> {
        self.send(
            self.table(Method::PATCH, "projects")
                .query(&owned_project(user_id, project_id))
                .json(update),
            "save generated code",
        )
        .await?;
        Ok(())
    }

    async fn owns_project(&self, user_id: &str, project_id: &str) -> Result<bool> {
        let rows: Vec<Value> = self
            .rows(
                self.table(Method::GET, "projects")
                    .query(&[("select", "id")])
                    .query(&owned_project(user_id, project_id)),
                "check project owner",
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_project(&self, project: &NewProject) -> Result<Project> {
        let rows: Vec<Project> = self
            .rows(
                self.table(Method::POST, "projects")
                    .header("Prefer", RETURN_ROWS)
                    .json(&[project]),
                "insert project",
            )
            .await?;
        rows.into_iter().next().ok_or_else(|| anyhow!("supabase insert project: no row returned"))
    }

    async fn list_projects(&self, user_id: &str) -> Result<Vec<ProjectSummary>> {
        self.rows(
            self.table(Method::GET, "projects").query(&[
                ("select", "id,name,created_at,html_code"),
                ("user_id", eq(user_id).as_str()),
                ("order", "created_at.desc"),
            ]),
            "list projects",
        )
        .await
    }

    async fn delete_project(&self, user_id: &str, project_id: &str) -> Result<()> {
        self.send(
            self.table(Method::DELETE, "projects")
                .query(&[("id", eq(project_id)), ("user_id", eq(user_id))]),
            "delete project",
        )
        .await?;
        Ok(())
    }

    async fn increment_interactions(&self, user_id: &str) -> Result<()> {
        self.send(
            self.client
                .post(format!("{}/rest/v1/rpc/increment_interaction_count", self.base))
                .json(&json!({ "user_id_input": user_id })),
            "increment interactions",
        )
        .await?;
        Ok(())
    }

    async fn start_trial(&self, user_id: &str, ends_at: DateTime<Utc>) -> Result<Option<Profile>> {
        let rows: Vec<Profile> = self
            .rows(
                self.table(Method::PATCH, "profiles")
                    .query(&[("id", eq(user_id))])
                    .header("Prefer", RETURN_ROWS)
                    .json(&TrialUpdate { trial_ends_at: ends_at }),
                "start trial",
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn brand_assets(&self, user_id: &str) -> Result<Option<BrandAssets>> {
        let rows: Vec<BrandAssets> = self
            .rows(
                self.table(Method::GET, "brand_assets")
                    .query(&[("select", "*"), ("user_id", eq(user_id).as_str())]),
                "load brand assets",
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_brand_assets(&self, patch: &BrandAssets) -> Result<()> {
        self.send(
            self.table(Method::POST, "brand_assets")
                .query(&[("on_conflict", "user_id")])
                .header("Prefer", MERGE_DUPLICATES)
                .json(patch),
            "upsert brand assets",
        )
        .await?;
        Ok(())
    }

    async fn clear_logo(&self, user_id: &str, variant: LogoVariant) -> Result<()> {
        let mut body = serde_json::Map::new();
        body.insert(variant.column().to_string(), Value::Null);
        self.send(
            self.table(Method::PATCH, "brand_assets")
                .query(&[("user_id", eq(user_id))])
                .json(&body),
            "clear logo",
        )
        .await?;
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[NewKnowledgeChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        self.send(
            self.table(Method::POST, "knowledge_base_chunks").json(chunks),
            "insert knowledge chunks",
        )
        .await?;
        Ok(())
    }

    async fn list_chunks(&self, user_id: &str) -> Result<Vec<KnowledgeChunk>> {
        self.rows(
            self.table(Method::GET, "knowledge_base_chunks").query(&[
                ("select", "id,content,created_at"),
                ("user_id", eq(user_id).as_str()),
                ("order", "created_at.desc"),
            ]),
            "list knowledge chunks",
        )
        .await
    }

    async fn delete_chunk(&self, user_id: &str, chunk_id: &str) -> Result<()> {
        self.send(
            self.table(Method::DELETE, "knowledge_base_chunks")
                .query(&[("id", eq(chunk_id)), ("user_id", eq(user_id))]),
            "delete knowledge chunk",
        )
        .await?;
        Ok(())
    }

    async fn marketing_rule(
        &self,
        user_id: &str,
        project_id: &str,
        target_element_id: &str,
    ) -> Result<Option<MarketingRule>> {
        let rows: Vec<MarketingRule> = self
            .rows(
                self.table(Method::GET, "live_marketing_rules").query(&[
                    ("select", "*".to_string()),
                    ("user_id", eq(user_id)),
                    ("project_id", eq(project_id)),
                    ("target_element_id", eq(target_element_id)),
                ]),
                "load marketing rule",
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_marketing_rule(&self, rule: &MarketingRule) -> Result<()> {
        // Update only the caller's row; a plain insert then fails on the
        // unique key if someone else holds it.
        let updated: Vec<Value> = self
            .rows(
                self.table(Method::PATCH, "live_marketing_rules")
                    .query(&[
                        ("project_id", eq(&rule.project_id)),
                        ("target_element_id", eq(&rule.target_element_id)),
                        ("user_id", eq(&rule.user_id)),
                    ])
                    .header("Prefer", RETURN_ROWS)
                    .json(&RuleUpdate {
                        original_content: rule.original_content.as_deref(),
                        is_enabled: rule.is_enabled,
                    }),
                "update marketing rule",
            )
            .await?;
        if !updated.is_empty() {
            return Ok(());
        }

        self.send(
            self.table(Method::POST, "live_marketing_rules").json(rule),
            "insert marketing rule",
        )
        .await?;
        Ok(())
    }

    async fn list_inspiration(&self) -> Result<Vec<Value>> {
        self.rows(
            self.table(Method::GET, "inspiration_items").query(&[("select", "*")]),
            "list inspiration",
        )
        .await
    }
}

#[derive(Serialize)]
struct RuleUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    original_content: Option<&'a str>,
    is_enabled: bool,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(rename = "Key")]
    key: Option<String>,
}

#[async_trait]
impl Blobs for SupabaseStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> Result<String> {
        let text = self
            .send(
                self.client
                    .post(self.object_url(bucket, path))
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .header("x-upsert", if upsert { "true" } else { "false" })
                    .body(bytes),
                "storage upload",
            )
            .await?;

        // `Key` is `<bucket>/<path>`; fall back to what we asked for.
        let stored = serde_json::from_str::<UploadResponse>(&text)
            .ok()
            .and_then(|r| r.key)
            .and_then(|k| k.strip_prefix(&format!("{bucket}/")).map(str::to_string))
            .unwrap_or_else(|| path.to_string());
        Ok(stored)
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{}", self.base, encode_path(path))
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        self.send(
            self.client
                .delete(format!("{}/storage/v1/object/{bucket}", self.base))
                .json(&json!({ "prefixes": paths })),
            "storage remove",
        )
        .await?;
        Ok(())
    }
}
