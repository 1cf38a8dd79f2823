use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use serde_json::{json, Value};

use super::upload::{read_form, UploadedFile};
use super::AppState;
use crate::brand;
use crate::errors::ApiError;
use crate::knowledge::{self, DocKind, NoText};
use crate::prompt;
use crate::store::{
    BrandAssets, KnowledgeChunk, LogoVariant, MarketingRule, NewProject, ProjectSummary,
    IMAGE_BUCKET, LOGO_BUCKET, MAX_PALETTE,
};
use crate::wire::{
    required, DeleteChunkRequest, DeleteLogoRequest, DeleteProjectRequest, FontPairRequest,
    GenerateRequest, GenerateResponse, PaletteRequest, PersonalizeRequest, PersonalizeResponse,
    SaveProjectRequest, ScanBrandRequest, ToggleRuleRequest, UserQuery,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<GenerateResponse> {
    let Json(req) = body?;
    req.validate().map_err(ApiError::bad_request)?;

    let resp = state.generator.generate(&req).await.map_err(|e| {
        ApiError::upstream("A server error occurred while communicating with the AI.")(e)
            .coded("FUNCTION_INVOCATION_FAILED")
    })?;
    Ok(Json(resp))
}

pub async fn personalize(
    State(state): State<AppState>,
    body: Result<Json<PersonalizeRequest>, JsonRejection>,
) -> ApiResult<PersonalizeResponse> {
    let Json(req) = body?;
    let original = required(&req.original_content)
        .ok_or_else(|| ApiError::bad_request("originalContent is required."))?;

    let reply = state
        .provider
        .complete(&prompt::personalize(original, req.visitor_context.as_ref()))
        .await
        .map_err(ApiError::upstream("Failed to generate personalized content."))?;
    Ok(Json(PersonalizeResponse { personalized_content: reply.trim().to_string() }))
}

pub async fn scan_brand(
    State(state): State<AppState>,
    body: Result<Json<ScanBrandRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    let (Some(user_id), Some(raw_url)) = (required(&req.user_id), required(&req.url)) else {
        return Err(ApiError::bad_request("User ID and URL are required."));
    };
    let url = brand::parse_target(raw_url)
        .ok_or_else(|| ApiError::bad_request("URL must be an http or https address."))?;

    let analysis = brand::scan(
        &state.http,
        state.provider.as_ref(),
        state.store.as_ref(),
        user_id,
        url,
        state.config.brand_text_limit,
    )
    .await
    .map_err(ApiError::upstream("Failed to scan brand."))?;

    Ok(Json(match analysis {
        Some(data) => json!({
            "message": "Brand assets identified and saved successfully.",
            "brandData": data,
        }),
        None => json!({
            "message": "The site could not be analyzed; nothing was saved.",
            "brandData": null,
        }),
    }))
}

pub async fn get_inspiration(State(state): State<AppState>) -> ApiResult<Vec<Value>> {
    let mut items = state
        .store
        .list_inspiration()
        .await
        .map_err(ApiError::upstream("Failed to fetch inspiration items."))?;
    items.shuffle(&mut rand::thread_rng());
    items.truncate(state.config.inspiration_count);
    Ok(Json(items))
}

pub async fn save_project(
    State(state): State<AppState>,
    body: Result<Json<SaveProjectRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    let (Some(user_id), Some(name), Some(html)) =
        (required(&req.user_id), required(&req.project_name), required(&req.html_code))
    else {
        return Err(ApiError::bad_request("Missing required project data."));
    };

    let project = state
        .store
        .insert_project(&NewProject {
            user_id: user_id.to_string(),
            name: name.to_string(),
            html_code: html.to_string(),
            chat_history: req.chat_history,
        })
        .await
        .map_err(ApiError::upstream("Failed to save project."))?;
    Ok(Json(json!({ "success": true, "project": project })))
}

pub async fn get_projects(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> ApiResult<Vec<ProjectSummary>> {
    let Query(q) = query?;
    let user_id = q.user_id().ok_or_else(|| ApiError::bad_request("User ID is required."))?;
    let projects = state
        .store
        .list_projects(user_id)
        .await
        .map_err(ApiError::upstream("Failed to fetch projects."))?;
    Ok(Json(projects))
}

pub async fn delete_project(
    State(state): State<AppState>,
    body: Result<Json<DeleteProjectRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    let (Some(user_id), Some(project_id)) = (required(&req.user_id), req.project_id.as_deref()) else {
        return Err(ApiError::bad_request("User ID and Project ID are required."));
    };
    state
        .store
        .delete_project(user_id, project_id)
        .await
        .map_err(ApiError::upstream("Failed to delete project."))?;
    Ok(Json(json!({ "success": true, "message": "Project deleted successfully." })))
}

async fn ingest_upload(state: &AppState, user_id: &str, file: &UploadedFile) -> ApiResult<Value> {
    let kind = DocKind::detect(file.content_type.as_deref(), Some(file.filename.as_str()));
    let count = knowledge::ingest(
        state.provider.as_ref(),
        state.store.as_ref(),
        user_id,
        kind,
        &file.bytes,
        state.config.chunk_chars,
    )
    .await
    .map_err(|e| match e.downcast_ref::<NoText>() {
        Some(no_text) => ApiError::bad_request(no_text.to_string()),
        None => ApiError::upstream("Failed to process file.")(e),
    })?;
    Ok(Json(json!({ "message": "File processed and stored successfully.", "chunkCount": count })))
}

pub async fn upload_to_knowledge_base(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Value> {
    let form = read_form(multipart).await?;
    let (Some(file), Some(user_id)) = (form.file.as_ref(), form.field("userId")) else {
        return Err(ApiError::bad_request("File and user ID are required."));
    };
    ingest_upload(&state, user_id, file).await
}

pub async fn get_knowledge_base_files(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> ApiResult<Vec<KnowledgeChunk>> {
    let Query(q) = query?;
    let user_id = q.user_id().ok_or_else(|| ApiError::bad_request("User ID is required."))?;
    let chunks = state
        .store
        .list_chunks(user_id)
        .await
        .map_err(ApiError::upstream("Failed to fetch knowledge base files."))?;
    Ok(Json(chunks))
}

pub async fn delete_knowledge_base_file(
    State(state): State<AppState>,
    body: Result<Json<DeleteChunkRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    let (Some(user_id), Some(chunk_id)) = (required(&req.user_id), req.chunk_id.as_deref()) else {
        return Err(ApiError::bad_request("User ID and Chunk ID are required."));
    };
    state
        .store
        .delete_chunk(user_id, chunk_id)
        .await
        .map_err(ApiError::upstream("Failed to delete file chunk."))?;
    Ok(Json(json!({ "message": "File chunk deleted successfully." })))
}

async fn store_logo(
    state: &AppState,
    user_id: &str,
    variant: LogoVariant,
    file: UploadedFile,
) -> ApiResult<Value> {
    let path = format!(
        "{user_id}/{}_{}_{}",
        variant.key(),
        Utc::now().timestamp_millis(),
        file.filename
    );
    let content_type = file.content_type().to_string();
    let fail = || ApiError::upstream("Failed to upload logo.");

    let stored = state
        .blobs
        .upload(LOGO_BUCKET, &path, file.bytes, &content_type, true)
        .await
        .map_err(fail())?;
    let url = state.blobs.public_url(LOGO_BUCKET, &stored);
    state
        .store
        .upsert_brand_assets(&BrandAssets::for_user(user_id).with_logo(variant, url.clone()))
        .await
        .map_err(fail())?;
    Ok(Json(json!({ "message": "Logo uploaded successfully.", "url": url })))
}

pub async fn upload_logo(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Value> {
    let mut form = read_form(multipart).await?;
    let user_id = form.field("userId").map(str::to_string);
    let variant = form.field("logoType").and_then(LogoVariant::from_key);
    let (Some(file), Some(user_id), Some(variant)) = (form.file.take(), user_id, variant) else {
        return Err(ApiError::bad_request("File, user ID, and logo type are required."));
    };
    store_logo(&state, &user_id, variant, file).await
}

pub async fn delete_logo(
    State(state): State<AppState>,
    body: Result<Json<DeleteLogoRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    let (Some(user_id), Some(variant)) = (required(&req.user_id), req.logo_type) else {
        return Err(ApiError::bad_request("User ID and logo type are required."));
    };
    let fail = || ApiError::upstream("Failed to remove logo.");

    let assets = state.store.brand_assets(user_id).await.map_err(fail())?;
    let Some(url) = assets.as_ref().and_then(|a| a.logo(variant)) else {
        return Ok(Json(json!({ "message": "No logo to delete." })));
    };

    let file_name = url.rsplit('/').next().unwrap_or_default();
    let file_name = urlencoding::decode(file_name).map(|c| c.into_owned()).unwrap_or_else(|_| file_name.to_string());
    if let Err(e) = state.blobs.remove(LOGO_BUCKET, &[format!("{user_id}/{file_name}")]).await {
        tracing::warn!(%user_id, error = %format!("{e:#}"), "logo object removal failed");
    }

    state.store.clear_logo(user_id, variant).await.map_err(fail())?;
    Ok(Json(json!({ "message": "Logo removed successfully." })))
}

async fn store_image(state: &AppState, user_id: &str, file: UploadedFile) -> ApiResult<Value> {
    let path = format!("{user_id}/images/{}_{}", Utc::now().timestamp_millis(), file.filename);
    let content_type = file.content_type().to_string();
    let stored = state
        .blobs
        .upload(IMAGE_BUCKET, &path, file.bytes, &content_type, false)
        .await
        .map_err(ApiError::upstream("Failed to upload image."))?;
    let url = state.blobs.public_url(IMAGE_BUCKET, &stored);
    Ok(Json(json!({ "message": "Image uploaded successfully.", "url": url })))
}

pub async fn upload_image(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Value> {
    let mut form = read_form(multipart).await?;
    let user_id = form.field("userId").map(str::to_string);
    let (Some(file), Some(user_id)) = (form.file.take(), user_id) else {
        return Err(ApiError::bad_request("File and user ID are required."));
    };
    store_image(&state, &user_id, file).await
}

pub async fn update_color_palette(
    State(state): State<AppState>,
    body: Result<Json<PaletteRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    let (Some(user_id), Some(palette)) = (required(&req.user_id), req.palette) else {
        return Err(ApiError::bad_request("User ID and a palette array are required."));
    };
    if palette.len() > MAX_PALETTE {
        return Err(ApiError::bad_request(format!("A palette holds at most {MAX_PALETTE} colors.")));
    }
    state
        .store
        .upsert_brand_assets(&BrandAssets { color_palette: Some(palette), ..BrandAssets::for_user(user_id) })
        .await
        .map_err(ApiError::upstream("Failed to save palette."))?;
    Ok(Json(json!({ "message": "Palette saved successfully." })))
}

pub async fn update_font_pair(
    State(state): State<AppState>,
    body: Result<Json<FontPairRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    let (Some(user_id), Some(font_pair)) = (required(&req.user_id), req.font_pair) else {
        return Err(ApiError::bad_request("User ID and a complete font pair are required."));
    };
    if !font_pair.is_complete() {
        return Err(ApiError::bad_request("User ID and a complete font pair are required."));
    }
    state
        .store
        .upsert_brand_assets(&BrandAssets { font_pair: Some(font_pair), ..BrandAssets::for_user(user_id) })
        .await
        .map_err(ApiError::upstream("Failed to save font pair."))?;
    Ok(Json(json!({ "message": "Font pair saved successfully." })))
}

pub async fn start_trial(
    State(state): State<AppState>,
    body: Result<Json<UserQuery>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    let user_id = req.user_id().ok_or_else(|| ApiError::bad_request("User ID is required."))?;
    let ends_at = Utc::now() + Duration::days(state.config.trial_days);
    let profile = state
        .store
        .start_trial(user_id, ends_at)
        .await
        .map_err(ApiError::upstream("Failed to start trial."))?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

pub async fn toggle_marketing_rule(
    State(state): State<AppState>,
    body: Result<Json<ToggleRuleRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    let (Some(user_id), Some(project_id), Some(target)) =
        (required(&req.user_id), req.project_id.as_deref(), required(&req.target_element_id))
    else {
        return Err(ApiError::bad_request("User ID, project ID and target element are required."));
    };
    let fail = || ApiError::upstream("Failed to save marketing rule.");

    if !state.store.owns_project(user_id, project_id).await.map_err(fail())? {
        return Err(ApiError::NotFound("Project not found.".into()));
    }
    let existing = state
        .store
        .marketing_rule(user_id, project_id, target)
        .await
        .map_err(fail())?;
    let is_enabled = req
        .is_enabled
        .unwrap_or_else(|| existing.as_ref().map_or(true, |r| !r.is_enabled));
    let rule = MarketingRule {
        project_id: project_id.to_string(),
        user_id: user_id.to_string(),
        target_element_id: target.to_string(),
        original_content: req.original_content.or_else(|| existing.and_then(|r| r.original_content)),
        is_enabled,
    };
    state.store.upsert_marketing_rule(&rule).await.map_err(fail())?;
    Ok(Json(json!({ "message": "Marketing rule saved.", "rule": rule })))
}
