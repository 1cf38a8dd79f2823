use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::export;
use crate::log;
use crate::personalize;
use crate::prompt;
use crate::provider::{extract_first_json_object, Completion, DynProvider, Message, Role};
use crate::quickstart;
use crate::reply::{self, Reply};
use crate::store::{CodeUpdate, DynStore};
use crate::templates::{self, TemplateKind};
use crate::wire::{GenerateRequest, GenerateResponse, Speaker, SynthesisRequest};

#[derive(Debug, Clone)]
pub struct Settings {
    /// Number of trailing history turns sent with a conversational request.
    pub history_window: usize,
    pub transcript_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self { history_window: 10, transcript_dir: None }
    }
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            history_window: cfg.history_window,
            transcript_dir: cfg.transcript_dir.as_ref().map(PathBuf::from),
        }
    }
}

/// A project the caller owns. Both ids are needed before anything is read
/// from or written to it.
#[derive(Debug, Clone, Copy)]
struct Owned<'a> {
    user_id: &'a str,
    project_id: &'a str,
}

impl<'a> Owned<'a> {
    fn from_request(req: &'a GenerateRequest) -> Option<Self> {
        let project_id = req.project_id.as_deref()?;
        match req.user_id() {
            Some(user_id) => Some(Self { user_id, project_id }),
            None => {
                warn!(%project_id, "projectId without userId; the project is not touched");
                None
            }
        }
    }
}

#[derive(Debug, Default)]
struct Working {
    code: Option<String>,
    rule_targets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DesignSummary {
    #[serde(default)]
    design_summary: Option<String>,
    #[serde(default)]
    component_list: Option<Vec<String>>,
}

pub struct Generator {
    provider: DynProvider,
    store: DynStore,
    settings: Settings,
}

impl Generator {
    pub fn new(provider: DynProvider, store: DynStore, settings: Settings) -> Self {
        Self { provider, store, settings }
    }

    /// Expects a request that already passed [`GenerateRequest::validate`].
    pub async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse> {
        let tx = Uuid::new_v4();
        let project = Owned::from_request(req);
        let working = self.working_context(req, project).await?;
        debug!(%tx, ?project, has_code = working.code.is_some(), rules = working.rule_targets.len(), "generate");

        let raw = match &req.synthesis {
            Some(synth) => self.synthesize(synth, tx).await?,
            None => {
                if req.history.len() <= 1 {
                    if let Some(kind) = req.prompt().and_then(quickstart::parse) {
                        self.meter(req.user_id());
                        return self.quick_start(kind, project, &working, tx).await;
                    }
                }
                self.converse(req, &working, tx).await?
            }
        };

        self.meter(req.user_id());
        self.classify(&raw, project, &working, tx).await
    }

    async fn working_context(&self, req: &GenerateRequest, project: Option<Owned<'_>>) -> Result<Working> {
        let mut working = Working { code: req.current_code().map(str::to_string), ..Default::default() };
        if let (Some(p), None) = (project, req.current_code()) {
            if let Some(ctx) = self
                .store
                .project_context(p.user_id, p.project_id)
                .await
                .context("loading project context")?
            {
                working.code = ctx.code;
                working.rule_targets = ctx.rule_targets;
            }
        }
        Ok(working)
    }

    async fn complete(&self, stage: &str, tx: Uuid, req: &Completion) -> Result<String> {
        let reply = self.provider.complete(req).await?;
        if let Some(dir) = &self.settings.transcript_dir {
            if let Err(e) = log::save_exchange(dir, tx, stage, req, &reply) {
                warn!(%tx, %stage, error = %e, "could not write transcript");
            }
        }
        Ok(reply)
    }

    async fn synthesize(&self, synth: &SynthesisRequest, tx: Uuid) -> Result<String> {
        let sources: Vec<(&str, &str)> = synth
            .template_names()
            .into_iter()
            .filter_map(|name| TemplateKind::from_key(name).map(|k| (name, k.html())))
            .collect();
        info!(%tx, sources = sources.len(), "synthesis request");

        let system = prompt::synthesis_prompt(synth.instruction().unwrap_or_default(), &sources);
        self.complete("synthesis", tx, &Completion::new(vec![Message::system(system)]))
            .await
            .context("synthesis completion")
    }

    async fn quick_start(
        &self,
        kind: TemplateKind,
        project: Option<Owned<'_>>,
        working: &Working,
        tx: Uuid,
    ) -> Result<GenerateResponse> {
        info!(%tx, template = kind.key(), "quick-start");
        let mut values = Vec::new();
        for (n, p) in kind.placeholders().iter().enumerate() {
            let req = prompt::enhancement(p.prompt, p.max_tokens);
            let text = match self.complete(&format!("enhance-{n}"), tx, &req).await {
                Ok(reply) => clean_copy(&reply).unwrap_or(p.fallback).to_string(),
                Err(e) => {
                    warn!(%tx, token = p.token, error = %format!("{e:#}"), "enhancement failed, using fallback");
                    p.fallback.to_string()
                }
            };
            values.push((p.token, text));
        }

        let html = templates::fill(kind.html(), &values);
        let html = self.process_and_save(project, html, &working.rule_targets, tx).await;
        let text = format!(
            "I've generated a new {} template for you. Here is a great starting point!",
            kind.key().to_lowercase()
        );
        Ok(GenerateResponse::visual(&text, html, Vec::new()))
    }

    async fn converse(&self, req: &GenerateRequest, working: &Working, tx: Uuid) -> Result<String> {
        let start = req.history.len().saturating_sub(self.settings.history_window);
        let mut messages = vec![Message::system(prompt::system_prompt(req.user_plan.as_deref()))];
        messages.extend(req.history[start..].iter().map(|turn| {
            let role = match turn.from {
                Speaker::Ai => Role::Assistant,
                Speaker::User => Role::User,
            };
            Message::text(role, turn.text())
        }));
        messages.push(prompt::user_turn(
            working.code.as_deref(),
            req.prompt().unwrap_or_default(),
            req.image(),
        ));

        self.complete("generate", tx, &Completion::new(messages))
            .await
            .context("generation completion")
    }

    async fn classify(
        &self,
        raw: &str,
        project: Option<Owned<'_>>,
        working: &Working,
        tx: Uuid,
    ) -> Result<GenerateResponse> {
        match reply::parse(raw) {
            Reply::Project { mut files, suggestions } => {
                files.html = self.process_and_save(project, files.html, &working.rule_targets, tx).await;
                let zip = export::zip_project_base64(&files).context("packaging project export")?;
                Ok(GenerateResponse::ProjectZip { zip, files, suggestions })
            }
            Reply::Visual { html, text, suggestions } => {
                let html = self.process_and_save(project, html, &working.rule_targets, tx).await;
                Ok(GenerateResponse::visual(&text, html, suggestions))
            }
            Reply::Text { text, suggestions } => {
                Ok(GenerateResponse::Functional { data: text, suggestions })
            }
        }
    }

    /// Marks personalization targets, summarizes and stores the html as the
    /// project's latest code. Never fails: a lost save is only logged.
    async fn process_and_save(
        &self,
        project: Option<Owned<'_>>,
        html: String,
        rule_targets: &[String],
        tx: Uuid,
    ) -> String {
        let Some(p) = project else { return html };
        if html.trim().is_empty() {
            return html;
        }

        let targets: Vec<&str> = rule_targets.iter().map(String::as_str).collect();
        let html = personalize::apply(&html, &targets);
        let summary = self.summarize(&html, tx).await;

        let update = CodeUpdate {
            latest_code: html.clone(),
            design_summary: summary.as_ref().and_then(|s| s.design_summary.clone()),
            component_list: summary.and_then(|s| s.component_list),
        };
        if let Err(e) = self.store.save_generated_code(p.user_id, p.project_id, &update).await {
            warn!(%tx, project_id = %p.project_id, error = %format!("{e:#}"), "saving generated code failed");
        }
        html
    }

    async fn summarize(&self, html: &str, tx: Uuid) -> Option<DesignSummary> {
        let reply = match self.complete("summary", tx, &prompt::summarize(html)).await {
            Ok(r) => r,
            Err(e) => {
                warn!(%tx, error = %format!("{e:#}"), "design summary failed");
                return None;
            }
        };
        let json = extract_first_json_object(&reply)?;
        serde_json::from_str(json)
            .map_err(|e| warn!(%tx, error = %e, "design summary was not valid JSON"))
            .ok()
    }

    /// Usage metering runs detached; its failure never reaches the caller.
    fn meter(&self, user_id: Option<&str>) {
        let Some(user_id) = user_id else { return };
        let store = Arc::clone(&self.store);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.increment_interactions(&user_id).await {
                warn!(%user_id, error = %format!("{e:#}"), "interaction metering failed");
            }
        });
    }
}

/// Model copy without surrounding whitespace and quotes; `None` if nothing is left.
fn clean_copy(raw: &str) -> Option<&str> {
    let text = raw.trim().trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”')).trim();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::scripted::ScriptedProvider;
    use crate::provider::Part;
    use crate::store::memory::MemoryStore;
    use crate::store::{MarketingRule, NewProject, Store};
    use crate::wire::ChatTurn;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use rstest::rstest;
    use std::io::Cursor;

    fn generator(provider: &Arc<ScriptedProvider>, store: &Arc<MemoryStore>) -> Generator {
        Generator::new(provider.clone(), store.clone(), Settings::default())
    }

    fn ask(prompt: &str) -> GenerateRequest {
        GenerateRequest { prompt: Some(prompt.into()), ..Default::default() }
    }

    fn turn(from: Speaker, text: &str) -> ChatTurn {
        ChatTurn { from, text: Some(text.into()), image: None, suggestions: None }
    }

    async fn project_with_rule(store: &MemoryStore, html: &str, target: &str) -> String {
        let p = store
            .insert_project(&NewProject {
                user_id: "u1".into(),
                name: "Site".into(),
                html_code: html.into(),
                chat_history: None,
            })
            .await
            .unwrap();
        store
            .upsert_marketing_rule(&MarketingRule {
                project_id: p.id.clone(),
                user_id: "u1".into(),
                target_element_id: target.into(),
                original_content: None,
                is_enabled: true,
            })
            .await
            .unwrap();
        p.id
    }

    #[tokio::test]
    async fn chatbot_quick_start_fills_the_assistant_name() {
        let provider = Arc::new(ScriptedProvider::new(["\"Nova\""]));
        let store = Arc::new(MemoryStore::new());

        let resp = generator(&provider, &store).generate(&ask("Create a chatbot for me")).await.unwrap();
        let GenerateResponse::Visual { data, html, suggestions } = resp else {
            panic!("expected visual, got {resp:?}");
        };
        assert!(data.starts_with("I've generated a new chatbot template for you."));
        assert!(html.contains(r#"id="chatbot-name""#));
        assert!(html.contains(">Nova</h3>"));
        assert!(!html.contains("[ASSISTANT_NAME]"));
        assert!(suggestions.is_empty());

        let requests = provider.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, Some(10));
    }

    #[rstest]
    #[tokio::test]
    async fn quick_start_fills_every_placeholder(
        #[values(
            TemplateKind::Website,
            TemplateKind::Portfolio,
            TemplateKind::Ecommerce,
            TemplateKind::LandingPage,
            TemplateKind::Chatbot
        )]
        kind: TemplateKind,
    ) {
        let copy: Vec<String> = (0..kind.placeholders().len()).map(|n| format!("Copy{n}")).collect();
        let provider = Arc::new(ScriptedProvider::new(copy.clone()));
        let store = Arc::new(MemoryStore::new());
        let prompt = format!("Generate a new '{}' project", kind.key().to_lowercase());

        let resp = generator(&provider, &store).generate(&ask(&prompt)).await.unwrap();
        let GenerateResponse::Visual { html, .. } = resp else { panic!("expected visual") };
        for (p, text) in kind.placeholders().iter().zip(&copy) {
            assert!(!html.contains(p.token), "{} left in {:?}", p.token, kind);
            assert!(html.contains(text.as_str()));
        }
        assert_eq!(provider.request_count(), kind.placeholders().len());
    }

    #[tokio::test]
    async fn failed_enhancements_fall_back_to_defaults() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = Arc::new(MemoryStore::new());

        let resp = generator(&provider, &store)
            .generate(&ask("Generate a new 'portfolio' project"))
            .await
            .unwrap();
        let GenerateResponse::Visual { html, .. } = resp else { panic!("expected visual") };
        for p in TemplateKind::Portfolio.placeholders() {
            assert!(!html.contains(p.token));
            assert!(html.contains(p.fallback));
        }
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn quick_start_is_skipped_mid_conversation() {
        let provider = Arc::new(ScriptedProvider::new(["Which colors do you like?"]));
        let store = Arc::new(MemoryStore::new());
        let req = GenerateRequest {
            history: vec![turn(Speaker::User, "hi"), turn(Speaker::Ai, "hello")],
            ..ask("Create a chatbot for me")
        };

        let resp = generator(&provider, &store).generate(&req).await.unwrap();
        assert!(matches!(resp, GenerateResponse::Functional { .. }));
    }

    #[tokio::test]
    async fn conversation_sends_last_ten_turns_and_plan() {
        let provider = Arc::new(ScriptedProvider::new(["Sure."]));
        let store = Arc::new(MemoryStore::new());
        let history = (0..12)
            .map(|i| turn(if i % 2 == 0 { Speaker::User } else { Speaker::Ai }, &format!("t{i}")))
            .collect();
        let req = GenerateRequest {
            history,
            user_plan: Some("Grid".into()),
            current_code: Some("<main>old</main>".into()),
            ..ask("Add a footer")
        };

        generator(&provider, &store).generate(&req).await.unwrap();
        let requests = provider.requests.lock();
        let msgs = &requests[0].messages;
        assert_eq!(msgs.len(), 12);
        assert!(msgs[0].joined_text().ends_with("CURRENT_USER_PLAN: Grid"));
        assert_eq!(msgs[1].joined_text(), "t2");
        assert_eq!(msgs[1].role, Role::User);
        assert_eq!(msgs[2].role, Role::Assistant);
        let last = msgs.last().unwrap();
        assert!(last.joined_text().contains("```html\n<main>old</main>\n```"));
        assert!(last.joined_text().ends_with("My request is: \"Add a footer\""));
    }

    #[tokio::test]
    async fn image_leads_the_user_turn() {
        let provider = Arc::new(ScriptedProvider::new(["Nice photo."]));
        let store = Arc::new(MemoryStore::new());
        let req = GenerateRequest {
            image_base64: Some("data:image/png;base64,AAAA".into()),
            ..Default::default()
        };
        generator(&provider, &store).generate(&req).await.unwrap();
        let requests = provider.requests.lock();
        let user = requests[0].messages.last().unwrap();
        assert!(matches!(&user.content[0], Part::Image(_)));
    }

    #[tokio::test]
    async fn visual_reply_is_personalized_and_saved() {
        let provider = Arc::new(ScriptedProvider::new([
            "Made the headline bolder.\n```html\n<body><h1 id=\"main-headline\" class=\"font-black\">Hi</h1></body>\n```\n---[suggestions]---\n[\"Add a hero image\"]",
            r#"{"design_summary": "A bold single-heading page.", "component_list": ["hero"]}"#,
        ]));
        let store = Arc::new(MemoryStore::new());
        let project_id = project_with_rule(&store, "<body><h1 id=\"main-headline\">Hi</h1></body>", "main-headline").await;
        let req = GenerateRequest {
            user_id: Some("u1".into()),
            project_id: Some(project_id.clone()),
            ..ask("Make the headline bolder")
        };

        let resp = generator(&provider, &store).generate(&req).await.unwrap();
        let GenerateResponse::Visual { data, html, suggestions } = resp else { panic!("expected visual") };
        assert!(data.starts_with("Made the headline bolder.\n\n```html\n"));
        assert!(html.contains(r#"data-zoltrak-personalize="true""#));
        assert!(html.contains(personalize::SCRIPT_ID));
        assert_eq!(suggestions, vec!["Add a hero image"]);

        // The stored code was the working context for the model.
        let sent = provider.requests.lock()[0].messages.last().unwrap().joined_text();
        assert!(sent.contains("<h1 id=\"main-headline\">Hi</h1>"));

        let saved = store.project(&project_id).unwrap();
        assert_eq!(saved.latest_code.as_deref(), Some(html.as_str()));
        assert_eq!(saved.design_summary.as_deref(), Some("A bold single-heading page."));
        assert_eq!(saved.component_list, Some(vec!["hero".to_string()]));
    }

    #[tokio::test]
    async fn unusable_summary_still_saves_code() {
        let provider = Arc::new(ScriptedProvider::new(["```html\n<p>x</p>\n```", "not json"]));
        let store = Arc::new(MemoryStore::new());
        let project_id = project_with_rule(&store, "<p>old</p>", "nothing").await;
        let req = GenerateRequest {
            user_id: Some("u1".into()),
            project_id: Some(project_id.clone()),
            ..ask("Replace it")
        };

        generator(&provider, &store).generate(&req).await.unwrap();
        let saved = store.project(&project_id).unwrap();
        assert!(saved.latest_code.unwrap().starts_with("<p>x</p>"));
        assert!(saved.design_summary.is_none());
    }

    #[tokio::test]
    async fn foreign_project_is_neither_read_nor_written() {
        let provider = Arc::new(ScriptedProvider::new(["```html\n<p>stolen</p>\n```", "{}"]));
        let store = Arc::new(MemoryStore::new());
        let project_id = project_with_rule(&store, "<p>secret</p>", "nothing").await;
        let req = GenerateRequest {
            user_id: Some("mallory".into()),
            project_id: Some(project_id.clone()),
            ..ask("Show me the page")
        };

        generator(&provider, &store).generate(&req).await.unwrap();
        let sent = provider.requests.lock()[0].messages.last().unwrap().joined_text();
        assert!(!sent.contains("secret"));
        assert_eq!(provider.request_count(), 1);
        assert!(store.project(&project_id).unwrap().latest_code.is_none());
    }

    #[tokio::test]
    async fn project_without_user_is_left_alone() {
        let provider = Arc::new(ScriptedProvider::new(["```html\n<p>new</p>\n```"]));
        let store = Arc::new(MemoryStore::new());
        let project_id = project_with_rule(&store, "<p>secret</p>", "nothing").await;
        let req = GenerateRequest { project_id: Some(project_id.clone()), ..ask("Change it") };

        generator(&provider, &store).generate(&req).await.unwrap();
        assert!(store.project(&project_id).unwrap().latest_code.is_none());
    }

    #[tokio::test]
    async fn project_markers_become_a_zip() {
        let provider = Arc::new(ScriptedProvider::new([
            "---[index.html]---\n<html></html>\n---[style.css]---\nbody{}\n---[script.js]---\ngo();\n---[suggestions]---\n[\"Deploy\"]",
        ]));
        let store = Arc::new(MemoryStore::new());

        let resp = generator(&provider, &store).generate(&ask("Give me the full project")).await.unwrap();
        let GenerateResponse::ProjectZip { zip, files, suggestions } = resp else { panic!("expected zip") };
        assert_eq!(files.html, "<html></html>");
        assert_eq!(files.js, "go();");
        assert_eq!(suggestions, vec!["Deploy"]);

        let archive = zip::ZipArchive::new(Cursor::new(STANDARD.decode(zip).unwrap())).unwrap();
        assert_eq!(archive.len(), 3);
        // No project id: nothing to summarize or save.
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn bad_suggestions_do_not_fail_the_request() {
        let raw = "Happy to help!\n---[suggestions]---\n[not json";
        let provider = Arc::new(ScriptedProvider::new([raw]));
        let store = Arc::new(MemoryStore::new());

        let resp = generator(&provider, &store).generate(&ask("hello")).await.unwrap();
        assert_eq!(resp, GenerateResponse::Functional { data: raw.into(), suggestions: vec![] });
    }

    #[tokio::test]
    async fn synthesis_uses_known_templates_in_order() {
        let provider = Arc::new(ScriptedProvider::new(["```html\n<p>merged</p>\n```"]));
        let store = Arc::new(MemoryStore::new());
        let req: GenerateRequest = serde_json::from_value(serde_json::json!({
            "history": [{"from": "user", "text": "ignored"}],
            "synthesis_request": {
                "components": {
                    "a": {"templateName": "landingpage"},
                    "b": {"templateName": "blog"},
                    "c": {"templateName": "website"}
                },
                "prompt": "Hero from 1, footer from 2"
            }
        }))
        .unwrap();

        let resp = generator(&provider, &store).generate(&req).await.unwrap();
        assert!(matches!(resp, GenerateResponse::Visual { .. }));

        let requests = provider.requests.lock();
        assert_eq!(requests[0].messages.len(), 1);
        let system = requests[0].messages[0].joined_text();
        let first = system.find("---[Source Code 1: landingpage]---").unwrap();
        let second = system.find("---[Source Code 2: website]---").unwrap();
        assert!(first < second);
        assert!(!system.contains("blog"));
    }

    #[tokio::test]
    async fn linked_requests_are_metered() {
        let provider = Arc::new(ScriptedProvider::new(["ok"]));
        let store = Arc::new(MemoryStore::new());
        let req = GenerateRequest { user_id: Some("u9".into()), ..ask("hi") };

        generator(&provider, &store).generate(&req).await.unwrap();
        for _ in 0..100 {
            if store.profile("u9").is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.profile("u9").unwrap().interaction_count, 1);
    }

    #[tokio::test]
    async fn provider_failure_is_an_error() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push_err("upstream 503");
        let store = Arc::new(MemoryStore::new());

        let err = generator(&provider, &store).generate(&ask("hi")).await.unwrap_err();
        assert!(format!("{err:#}").contains("upstream 503"));
    }

    #[tokio::test]
    async fn transcripts_are_written_when_configured() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(["ok"]));
        let store = Arc::new(MemoryStore::new());
        let settings = Settings { transcript_dir: Some(tmp.path().to_path_buf()), ..Default::default() };

        Generator::new(provider, store, settings).generate(&ask("hi")).await.unwrap();
        let tx_dir = std::fs::read_dir(tmp.path()).unwrap().next().unwrap().unwrap().path();
        assert!(tx_dir.join("generate.request.json").exists());
        assert!(tx_dir.join("generate.response.json").exists());
    }

    #[test]
    fn copy_cleanup() {
        assert_eq!(clean_copy("  \"SiteGuide\"\n"), Some("SiteGuide"));
        assert_eq!(clean_copy("“Nova”"), Some("Nova"));
        assert_eq!(clean_copy(" '' "), None);
    }
}
