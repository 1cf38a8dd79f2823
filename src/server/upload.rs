use axum::extract::Multipart;
use bytes::Bytes;
use std::collections::HashMap;

use crate::errors::ApiError;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or("application/octet-stream")
    }
}

#[derive(Debug, Default)]
pub struct Form {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl Form {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
    }
}

/// Client-supplied names lose any directory part.
pub fn base_name(raw: &str) -> String {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() { "upload".to_string() } else { name.to_string() }
}

/// Reads every part: the `file` part becomes [`Form::file`], the rest are
/// text fields. An oversized upload keeps its 413.
pub async fn read_form(mut multipart: Multipart) -> Result<Form, ApiError> {
    let mut form = Form::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::rejected(e.status(), e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = base_name(field.file_name().unwrap_or_default());
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(|e| ApiError::rejected(e.status(), e.body_text()))?;
            form.file = Some(UploadedFile { filename, content_type, bytes });
        } else {
            let value = field.text().await.map_err(|e| ApiError::rejected(e.status(), e.body_text()))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("C:\\Users\\me\\logo.png"), "logo.png");
        assert_eq!(base_name("../../etc/passwd"), "passwd");
        assert_eq!(base_name(""), "upload");
    }

    #[test]
    fn blank_fields_are_missing() {
        let form = Form {
            fields: HashMap::from([("userId".to_string(), "  ".to_string())]),
            file: None,
        };
        assert_eq!(form.field("userId"), None);
    }
}
