use std::collections::HashSet;
use std::time::Duration;

use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use diesel::dsl::exists;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Document, NewDocument};
use crate::schema::{documents, folders};
use crate::state::AppState;
use crate::storage::ObjectUpload;
use crate::utils::json::nullable;
use crate::utils::text::{contains_ci, normalize_term};
use crate::utils::time::to_iso;

const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 300;
const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Human readable size using 1024-based units, at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", SIZE_UNITS[unit])
}

/// Trims tags, drops blanks and duplicates, keeps first-seen order.
/// Each raw value may itself hold several comma separated tags.
pub fn normalize_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for value in raw {
        for tag in value.as_ref().split(',') {
            let tag = tag.trim();
            if !tag.is_empty() && seen.insert(tag.to_string()) {
                tags.push(tag.to_string());
            }
        }
    }
    tags
}

#[derive(Deserialize)]
pub struct DocumentListQuery {
    pub q: Option<String>,
    pub starred: Option<bool>,
    pub folder_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateDocumentRequest {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_starred: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub folder_id: Option<Option<Uuid>>,
}

#[derive(Serialize, Clone)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: String,
    pub size_bytes: i64,
    pub url: Option<String>,
    pub tags: Vec<String>,
    pub is_starred: bool,
    pub folder_id: Option<Uuid>,
    pub modified_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            name: doc.name,
            content_type: doc.content_type,
            size: doc.size,
            size_bytes: doc.size_bytes,
            url: doc.url,
            tags: doc.tags,
            is_starred: doc.is_starred,
            folder_id: doc.folder_id,
            modified_by: doc.modified_by,
            created_at: to_iso(doc.created_at),
            updated_at: to_iso(doc.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct DocumentDownloadResponse {
    pub url: String,
    pub expires_in: u64,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
}

struct UploadRequest {
    bytes: Vec<u8>,
    original_name: String,
    content_type: Option<String>,
    folder_id: Option<Uuid>,
    tags: Vec<String>,
    modified_by: String,
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<DocumentListQuery>,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let mut conn = state.db()?;

    let mut query = documents::table.into_boxed();
    if let Some(starred) = params.starred {
        query = query.filter(documents::is_starred.eq(starred));
    }
    if let Some(folder_id) = params.folder_id {
        query = query.filter(documents::folder_id.eq(folder_id));
    }

    let rows: Vec<Document> = query.order(documents::created_at.desc()).load(&mut conn)?;
    let term = normalize_term(params.q.as_deref());

    let response = rows
        .into_iter()
        .filter(|doc| term.as_deref().map_or(true, |term| document_matches(doc, term)))
        .map(DocumentResponse::from)
        .collect();

    Ok(Json(response))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let doc: Document = documents::table.find(document_id).first(&mut conn)?;
    Ok(Json(doc.into()))
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut folder_id: Option<Uuid> = None;
    let mut raw_tags: Vec<String> = Vec::new();
    let mut modified_by: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        let msg = format!("invalid multipart data: {err}");
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(msg)
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                original_name = field.file_name().map(|n| n.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    let msg = format!("failed to read file bytes: {err}");
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(msg)
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("folder_id") => {
                let value = read_text_field(field, "folder_id").await?;
                if !value.trim().is_empty() {
                    let parsed = Uuid::parse_str(value.trim())
                        .map_err(|_| AppError::bad_request("folder_id must be a valid UUID"))?;
                    folder_id = Some(parsed);
                }
            }
            Some("tags") => {
                raw_tags.push(read_text_field(field, "tags").await?);
            }
            Some("modified_by") => {
                let value = read_text_field(field, "modified_by").await?;
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    modified_by = Some(trimmed.to_string());
                }
            }
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| {
        error!("upload rejected: missing file field");
        AppError::bad_request("file field is required")
    })?;

    if file_bytes.is_empty() {
        error!("upload rejected: empty file payload");
        return Err(AppError::bad_request("file field must not be empty"));
    }
    let original_name = original_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            error!("upload rejected: missing original filename");
            AppError::bad_request("filename is required")
        })?;
    let original_name_for_log = original_name.clone();

    let request = UploadRequest {
        bytes: file_bytes,
        original_name,
        content_type,
        folder_id,
        tags: normalize_tags(&raw_tags),
        modified_by: modified_by.unwrap_or(user.display_name),
    };

    match process_upload(&state, request).await {
        Ok(document) => {
            info!(
                document_id = %document.id,
                name = %document.name,
                size = %document.size,
                "document upload succeeded"
            );
            Ok((StatusCode::CREATED, Json(document)))
        }
        Err(err) => {
            error!(error = %err, name = %original_name_for_log, "document upload failed");
            Err(err)
        }
    }
}

pub async fn update_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<UpdateDocumentRequest>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let mut doc: Document = documents::table.find(document_id).first(&mut conn)?;

    if payload.name.is_none()
        && payload.tags.is_none()
        && payload.is_starred.is_none()
        && payload.folder_id.is_none()
    {
        return Err(AppError::bad_request("no changes provided"));
    }

    if let Some(name) = payload.name.as_deref() {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(AppError::bad_request("name must not be empty"));
        }
        doc.name = trimmed.to_string();
    }
    if let Some(tags) = payload.tags {
        doc.tags = normalize_tags(tags);
    }
    if let Some(is_starred) = payload.is_starred {
        doc.is_starred = is_starred;
    }
    if let Some(folder_id) = payload.folder_id {
        if let Some(folder_id) = folder_id {
            ensure_folder_exists(&mut conn, folder_id)?;
        }
        doc.folder_id = folder_id;
    }

    diesel::update(documents::table.find(document_id))
        .set((
            documents::name.eq(&doc.name),
            documents::tags.eq(&doc.tags),
            documents::is_starred.eq(doc.is_starred),
            documents::folder_id.eq(doc.folder_id),
            documents::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let doc: Document = documents::table.find(document_id).first(&mut conn)?;
    Ok(Json(doc.into()))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let storage_key = {
        let mut conn = state.db()?;
        let doc: Document = documents::table.find(document_id).first(&mut conn)?;
        diesel::delete(documents::table.find(document_id)).execute(&mut conn)?;
        doc.storage_key
    };

    if let Err(err) = state.storage.delete_object(&storage_key).await {
        warn!(
            document_id = %document_id,
            key = %storage_key,
            error = %err,
            "failed to delete stored document object"
        );
    }

    info!(document_id = %document_id, "document deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<DocumentDownloadResponse>> {
    let doc: Document = {
        let mut conn = state.db()?;
        documents::table.find(document_id).first(&mut conn)?
    };

    let presigned_url = state
        .storage
        .presign_get_object(
            &doc.storage_key,
            Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS),
        )
        .await
        .map_err(|err| AppError::internal(format!("failed to generate download URL: {err}")))?;

    Ok(Json(DocumentDownloadResponse {
        url: presigned_url,
        expires_in: PRESIGNED_URL_EXPIRY_SECONDS,
        filename: doc.name,
        content_type: doc.content_type,
        size_bytes: doc.size_bytes,
    }))
}

async fn process_upload(state: &AppState, request: UploadRequest) -> AppResult<DocumentResponse> {
    let UploadRequest {
        bytes,
        original_name,
        content_type,
        folder_id,
        tags,
        modified_by,
    } = request;

    if let Some(folder) = folder_id {
        let mut conn = state.db()?;
        ensure_folder_exists(&mut conn, folder)?;
    }

    let doc_id = Uuid::new_v4();
    let size_bytes = bytes.len() as i64;
    let content_type = content_type
        .or_else(|| {
            mime_guess::from_path(&original_name)
                .first()
                .map(|mime| mime.to_string())
        })
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let upload = ObjectUpload::document(doc_id, &original_name, bytes, content_type.clone());
    let storage_key = upload.key.clone();
    state.storage.put_object(upload).await.map_err(|err| {
        error!(error = %err, key = %storage_key, "failed to store document");
        AppError::internal(format!("failed to store document: {err}"))
    })?;

    let new_document = NewDocument {
        id: doc_id,
        name: original_name,
        content_type,
        size: format_file_size(size_bytes as u64),
        size_bytes,
        url: Some(format!("/api/documents/{doc_id}/download")),
        storage_key,
        tags,
        is_starred: false,
        folder_id,
        modified_by,
    };

    let mut conn = state.db()?;
    diesel::insert_into(documents::table)
        .values(&new_document)
        .execute(&mut conn)?;

    let document: Document = documents::table.find(doc_id).first(&mut conn)?;
    Ok(document.into())
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> AppResult<String> {
    field.text().await.map_err(|err| {
        error!(error = %err, field = %name, "invalid multipart text field");
        AppError::bad_request(format!("invalid {name}: {err}"))
    })
}

pub(crate) fn ensure_folder_exists(conn: &mut PgConnection, folder_id: Uuid) -> AppResult<()> {
    let exists: bool = diesel::select(exists(folders::table.filter(folders::id.eq(folder_id))))
        .get_result(conn)?;
    if !exists {
        return Err(AppError::bad_request("folder does not exist"));
    }
    Ok(())
}

fn document_matches(doc: &Document, term: &str) -> bool {
    contains_ci(&doc.name, term) || doc.tags.iter().any(|tag| contains_ci(tag, term))
}
