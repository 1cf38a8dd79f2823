use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::store::{FontPair, LogoVariant};

pub use crate::reply::ProjectFiles;

/// ========================================
/// HTTP request/response wire protocol
/// ========================================

/// Backend row ids arrive as numbers or strings; both become opaque strings.
pub fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }
    Ok(match Raw::deserialize(d)? {
        Raw::Num(n) => n.to_string(),
        Raw::Str(s) => s,
    })
}

pub fn opt_id_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "id_string")] String);
    let raw: Option<Wrap> = Option::deserialize(d)?;
    Ok(raw.map(|w| w.0).filter(|s| !s.trim().is_empty()))
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Ai,
    #[serde(other)]
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub from: Speaker,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

impl ChatTurn {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SynthesisRequest {
    /// `{ <slot>: { templateName, section? } }`, in request order.
    #[serde(default)]
    pub components: Map<String, Value>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl SynthesisRequest {
    pub fn template_names(&self) -> Vec<&str> {
        self.components
            .values()
            .filter_map(|c| c.get("templateName").and_then(Value::as_str))
            .collect()
    }

    pub fn instruction(&self) -> Option<&str> {
        non_blank(&self.prompt)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub user_plan: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub current_code: Option<String>,
    #[serde(default, rename = "synthesis_request")]
    pub synthesis: Option<SynthesisRequest>,
}

impl GenerateRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        match &self.synthesis {
            Some(s) if s.instruction().is_none() => Err("A synthesis prompt is required."),
            Some(_) => Ok(()),
            None if self.prompt().is_none() && self.image().is_none() => {
                Err("A prompt is required.")
            }
            None => Ok(()),
        }
    }

    pub fn prompt(&self) -> Option<&str> {
        non_blank(&self.prompt)
    }

    pub fn image(&self) -> Option<&str> {
        non_blank(&self.image_base64)
    }

    pub fn user_id(&self) -> Option<&str> {
        non_blank(&self.user_id)
    }

    pub fn current_code(&self) -> Option<&str> {
        non_blank(&self.current_code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerateResponse {
    ProjectZip {
        zip: String,
        files: ProjectFiles,
        suggestions: Vec<String>,
    },
    Visual {
        data: String,
        html: String,
        suggestions: Vec<String>,
    },
    Functional {
        data: String,
        suggestions: Vec<String>,
    },
}

impl GenerateResponse {
    pub fn visual(text: &str, html: String, suggestions: Vec<String>) -> Self {
        GenerateResponse::Visual {
            data: format!("{text}\n\n```html\n{html}\n```"),
            html,
            suggestions,
        }
    }
}

/// ========================================
/// Everything else the SPA calls
/// ========================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizeRequest {
    #[serde(default)]
    pub original_content: Option<String>,
    #[serde(default)]
    pub visitor_context: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizeResponse {
    pub personalized_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanBrandRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

impl UserQuery {
    pub fn user_id(&self) -> Option<&str> {
        non_blank(&self.user_id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProjectRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub html_code: Option<String>,
    #[serde(default)]
    pub chat_history: Option<Vec<ChatTurn>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteProjectRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteChunkRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub chunk_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLogoRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub logo_type: Option<LogoVariant>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub palette: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontPairRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub font_pair: Option<FontPair>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRuleRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub target_element_id: Option<String>,
    #[serde(default)]
    pub original_content: Option<String>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
}

pub fn required(field: &Option<String>) -> Option<&str> {
    non_blank(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generate_request_accepts_client_shape() {
        let req: GenerateRequest = serde_json::from_value(json!({
            "history": [
                {"from": "user", "text": "hi"},
                {"from": "ai", "text": "hello", "suggestions": ["More"]},
                {"from": "system"}
            ],
            "prompt": "Make it blue",
            "userPlan": "Volt",
            "userId": "u1",
            "projectId": 42,
            "synthesis_request": {
                "components": {
                    "hero": {"templateName": "website"},
                    "grid": {"templateName": "portfolio", "section": "projects"}
                },
                "prompt": "Take the hero from 1"
            }
        }))
        .unwrap();

        assert_eq!(req.history[1].from, Speaker::Ai);
        assert_eq!(req.history[2].from, Speaker::User);
        assert_eq!(req.history[2].text(), "");
        assert_eq!(req.project_id.as_deref(), Some("42"));
        let synth = req.synthesis.as_ref().unwrap();
        assert_eq!(synth.template_names(), vec!["website", "portfolio"]);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn validation_messages() {
        assert_eq!(GenerateRequest::default().validate(), Err("A prompt is required."));

        let image_only = GenerateRequest {
            image_base64: Some("data:image/png;base64,AA".into()),
            ..Default::default()
        };
        assert!(image_only.validate().is_ok());

        let blank_synth = GenerateRequest {
            synthesis: Some(SynthesisRequest { prompt: Some(" ".into()), ..Default::default() }),
            ..Default::default()
        };
        assert_eq!(blank_synth.validate(), Err("A synthesis prompt is required."));
    }

    #[test]
    fn response_is_tagged_by_type() {
        let resp = GenerateResponse::visual("Done.", "<p/>".into(), vec!["Next".into()]);
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["type"], "visual");
        assert_eq!(v["data"], "Done.\n\n```html\n<p/>\n```");
        assert_eq!(v["html"], "<p/>");

        let zip = GenerateResponse::ProjectZip {
            zip: "UEs=".into(),
            files: ProjectFiles::default(),
            suggestions: vec![],
        };
        assert_eq!(serde_json::to_value(&zip).unwrap()["type"], "project_zip");
    }

    #[test]
    fn string_and_numeric_ids() {
        let a: DeleteChunkRequest = serde_json::from_value(json!({"userId": "u", "chunkId": "c-9"})).unwrap();
        let b: DeleteChunkRequest = serde_json::from_value(json!({"userId": "u", "chunkId": 9})).unwrap();
        let c: DeleteChunkRequest = serde_json::from_value(json!({"userId": "u"})).unwrap();
        assert_eq!(a.chunk_id.as_deref(), Some("c-9"));
        assert_eq!(b.chunk_id.as_deref(), Some("9"));
        assert!(c.chunk_id.is_none());
    }
}
