use anyhow::{anyhow, bail, Context, Result};

use crate::provider::Provider;
use crate::store::{NewKnowledgeChunk, Store};

const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Pdf,
    Docx,
    Text,
}

impl DocKind {
    /// Mime type first, then the file extension; anything else is read as text.
    pub fn detect(mime: Option<&str>, filename: Option<&str>) -> Self {
        match mime.map(|m| m.trim().to_ascii_lowercase()).as_deref() {
            Some(PDF_MIME) => return DocKind::Pdf,
            Some(DOCX_MIME) => return DocKind::Docx,
            _ => {}
        }
        let ext = filename
            .and_then(|f| f.rsplit_once('.'))
            .map(|(_, e)| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => DocKind::Pdf,
            Some("docx") => DocKind::Docx,
            _ => DocKind::Text,
        }
    }
}

fn docx_text(bytes: &[u8]) -> Result<String> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| anyhow!("reading docx: {e}"))?;
    let mut text = String::new();
    for child in docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            for child in p.children {
                if let docx_rs::ParagraphChild::Run(r) = child {
                    for child in r.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            text.push('\n');
        }
    }
    Ok(text)
}

pub fn extract_text(kind: DocKind, bytes: &[u8]) -> Result<String> {
    match kind {
        DocKind::Pdf => pdf_extract::extract_text_from_mem(bytes).map_err(|e| anyhow!("reading pdf: {e}")),
        DocKind::Docx => docx_text(bytes),
        DocKind::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Consecutive windows of at most `size` characters. Whitespace-only input
/// yields nothing.
pub fn chunk(text: &str, size: usize) -> Vec<String> {
    if text.trim().is_empty() || size == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|w| w.iter().collect()).collect()
}

#[derive(Debug, thiserror::Error)]
#[error("Could not extract text from the file.")]
pub struct NoText;

/// Extracts, chunks, embeds and stores a document. Returns the chunk count.
/// An empty document fails with [`NoText`] before any upstream call.
pub async fn ingest(
    provider: &dyn Provider,
    store: &dyn Store,
    user_id: &str,
    kind: DocKind,
    bytes: &[u8],
    chunk_chars: usize,
) -> Result<usize> {
    let text = extract_text(kind, bytes)?;
    let chunks = chunk(&text, chunk_chars);
    if chunks.is_empty() {
        return Err(NoText.into());
    }

    let vectors = provider.embed(&chunks).await.context("embedding knowledge chunks")?;
    if vectors.len() != chunks.len() {
        bail!("embedding count mismatch: {} chunks, {} vectors", chunks.len(), vectors.len());
    }

    let rows: Vec<NewKnowledgeChunk> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(content, embedding)| NewKnowledgeChunk { user_id: user_id.to_string(), content, embedding })
        .collect();
    store.insert_chunks(&rows).await.context("storing knowledge chunks")?;
    tracing::info!(%user_id, chunks = rows.len(), "knowledge base updated");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::scripted::ScriptedProvider;
    use crate::store::memory::MemoryStore;
    use rstest::rstest;

    #[rstest]
    #[case(Some("application/pdf"), Some("notes.txt"), DocKind::Pdf)]
    #[case(Some(DOCX_MIME), None, DocKind::Docx)]
    #[case(Some("application/octet-stream"), Some("Brief.DOCX"), DocKind::Docx)]
    #[case(None, Some("about.pdf"), DocKind::Pdf)]
    #[case(Some("text/plain"), Some("readme.md"), DocKind::Text)]
    #[case(None, None, DocKind::Text)]
    fn detects_kind(#[case] mime: Option<&str>, #[case] name: Option<&str>, #[case] expected: DocKind) {
        assert_eq!(DocKind::detect(mime, name), expected);
    }

    #[test]
    fn chunks_by_characters() {
        let text = "é".repeat(2500);
        let chunks = chunk(&text, 1000);
        assert_eq!(chunks.iter().map(|c| c.chars().count()).collect::<Vec<_>>(), vec![1000, 1000, 500]);
        assert!(chunk(" \n\t ", 1000).is_empty());
    }

    #[tokio::test]
    async fn ingest_embeds_once_and_stores_every_chunk() {
        let provider = ScriptedProvider::default();
        let store = MemoryStore::new();
        let doc = "a".repeat(2001);

        let n = ingest(&provider, &store, "u1", DocKind::Text, doc.as_bytes(), 1000).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(provider.embedded.lock().len(), 3);
        assert_eq!(store.list_chunks("u1").await.unwrap().len(), 3);
        assert_eq!(store.list_chunks("u1").await.unwrap()[0].content, "a");
    }

    #[tokio::test]
    async fn empty_document_is_rejected_before_embedding() {
        let provider = ScriptedProvider::default();
        let store = MemoryStore::new();
        let err = ingest(&provider, &store, "u1", DocKind::Text, b"   ", 1000).await.unwrap_err();
        assert!(err.downcast_ref::<NoText>().is_some());
        assert!(provider.embedded.lock().is_empty());
    }
}
