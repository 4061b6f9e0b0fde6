use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use diesel::{dsl::exists, prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Document, Folder, NewFolder};
use crate::schema::{documents, folders};
use crate::state::AppState;
use crate::utils::json::nullable;
use crate::utils::time::to_iso;

use super::documents::{ensure_folder_exists, DocumentResponse};

#[derive(Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateFolderRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub parent_id: Option<Option<Uuid>>,
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct FolderResponse {
    pub folder: FolderInfo,
}

#[derive(Serialize)]
pub struct FolderContentsResponse {
    pub folder: Option<FolderInfo>,
    pub subfolders: Vec<FolderInfo>,
    pub documents: Vec<DocumentResponse>,
}

#[derive(Serialize)]
pub struct FolderInfo {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

pub async fn create_folder(
    State(state): State<AppState>,
    Json(payload): Json<CreateFolderRequest>,
) -> AppResult<(StatusCode, Json<FolderResponse>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let mut conn = state.db()?;

    if let Some(parent_id) = payload.parent_id {
        ensure_folder_exists(&mut conn, parent_id)?;
    }
    ensure_name_available(&mut conn, payload.parent_id, name, None)?;

    let new_folder = NewFolder {
        id: Uuid::new_v4(),
        name: name.to_string(),
        parent_id: payload.parent_id,
    };

    diesel::insert_into(folders::table)
        .values(&new_folder)
        .execute(&mut conn)?;

    let folder: Folder = folders::table.find(new_folder.id).first(&mut conn)?;
    info!(folder_id = %folder.id, "folder created");
    Ok((
        StatusCode::CREATED,
        Json(FolderResponse {
            folder: folder_to_info(folder),
        }),
    ))
}

pub async fn list_folder_contents(
    State(state): State<AppState>,
    Path(folder_identifier): Path<String>,
) -> AppResult<Json<FolderContentsResponse>> {
    let mut conn = state.db()?;

    let folder_id = if folder_identifier.eq_ignore_ascii_case("root") {
        None
    } else {
        Some(
            Uuid::parse_str(&folder_identifier)
                .map_err(|_| AppError::bad_request("folder identifier must be 'root' or a UUID"))?,
        )
    };

    let folder = match folder_id {
        Some(id) => Some(folder_to_info(
            folders::table.find(id).first::<Folder>(&mut conn)?,
        )),
        None => None,
    };

    let (child_folders, docs): (Vec<Folder>, Vec<Document>) = if let Some(parent_id) = folder_id {
        (
            folders::table
                .filter(folders::parent_id.eq(parent_id))
                .order(folders::name.asc())
                .load(&mut conn)?,
            documents::table
                .filter(documents::folder_id.eq(parent_id))
                .order(documents::created_at.desc())
                .load(&mut conn)?,
        )
    } else {
        (
            folders::table
                .filter(folders::parent_id.is_null())
                .order(folders::name.asc())
                .load(&mut conn)?,
            documents::table
                .filter(documents::folder_id.is_null())
                .order(documents::created_at.desc())
                .load(&mut conn)?,
        )
    };

    Ok(Json(FolderContentsResponse {
        folder,
        subfolders: child_folders.into_iter().map(folder_to_info).collect(),
        documents: docs.into_iter().map(DocumentResponse::from).collect(),
    }))
}

pub async fn delete_folder(
    State(state): State<AppState>,
    Path(folder_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;

    conn.transaction::<_, AppError, _>(|conn| {
        folders::table.find(folder_id).first::<Folder>(conn)?;

        let has_child_folders: bool = diesel::select(exists(
            folders::table.filter(folders::parent_id.eq(Some(folder_id))),
        ))
        .get_result(conn)?;

        let has_documents: bool = diesel::select(exists(
            documents::table.filter(documents::folder_id.eq(Some(folder_id))),
        ))
        .get_result(conn)?;

        if has_child_folders || has_documents {
            return Err(AppError::bad_request(
                "folder must be empty before deletion",
            ));
        }

        diesel::delete(folders::table.find(folder_id)).execute(conn)?;

        Ok(())
    })?;

    info!(folder_id = %folder_id, "folder deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_folder(
    State(state): State<AppState>,
    Path(folder_id): Path<Uuid>,
    Json(payload): Json<UpdateFolderRequest>,
) -> AppResult<Json<FolderResponse>> {
    let mut conn = state.db()?;

    let folder = conn.transaction::<Folder, AppError, _>(|conn| {
        let folder: Folder = folders::table.find(folder_id).first(conn)?;

        let mut next_parent = folder.parent_id;
        if let Some(parent_request) = payload.parent_id {
            if let Some(parent_id) = parent_request {
                let _parent: Folder = folders::table.find(parent_id).first(conn)?;
            }
            if would_create_cycle(conn, folder_id, parent_request)? {
                return Err(AppError::bad_request(
                    "cannot move folder into itself or a descendant",
                ));
            }
            next_parent = parent_request;
        }

        let mut new_name = folder.name.clone();
        if let Some(name) = payload.name.as_deref() {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(AppError::bad_request("name must not be empty"));
            }
            new_name = trimmed.to_string();
        }

        if next_parent == folder.parent_id && new_name == folder.name {
            return Ok(folder);
        }

        ensure_name_available(conn, next_parent, &new_name, Some(folder_id))?;

        diesel::update(folders::table.find(folder_id))
            .set((
                folders::parent_id.eq(next_parent),
                folders::name.eq(&new_name),
                folders::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        Ok(folders::table.find(folder_id).first(conn)?)
    })?;

    Ok(Json(FolderResponse {
        folder: folder_to_info(folder),
    }))
}

fn folder_to_info(folder: Folder) -> FolderInfo {
    FolderInfo {
        id: folder.id,
        name: folder.name,
        parent_id: folder.parent_id,
        created_at: to_iso(folder.created_at),
        updated_at: to_iso(folder.updated_at),
    }
}

fn ensure_name_available(
    conn: &mut PgConnection,
    parent_id: Option<Uuid>,
    name: &str,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let mut query = folders::table
        .filter(folders::name.eq(name))
        .into_boxed();
    query = match parent_id {
        Some(parent_id) => query.filter(folders::parent_id.eq(parent_id)),
        None => query.filter(folders::parent_id.is_null()),
    };
    if let Some(exclude) = exclude {
        query = query.filter(folders::id.ne(exclude));
    }

    if query.first::<Folder>(conn).optional()?.is_some() {
        return Err(AppError::conflict(
            "a folder with the same name already exists in the target",
        ));
    }
    Ok(())
}

fn would_create_cycle(
    conn: &mut PgConnection,
    folder_id: Uuid,
    new_parent: Option<Uuid>,
) -> AppResult<bool> {
    match new_parent {
        None => Ok(false),
        Some(parent_id) => {
            let descendants = gather_descendant_folder_ids(conn, folder_id)?;
            Ok(descendants.contains(&parent_id))
        }
    }
}

/// The folder itself followed by every folder below it.
fn gather_descendant_folder_ids(
    conn: &mut PgConnection,
    folder_id: Uuid,
) -> AppResult<Vec<Uuid>> {
    let mut ids = vec![folder_id];
    let mut queue = vec![folder_id];

    while let Some(current) = queue.pop() {
        let child_ids: Vec<Uuid> = folders::table
            .filter(folders::parent_id.eq(Some(current)))
            .select(folders::id)
            .load(conn)?;
        queue.extend(child_ids.iter().copied());
        ids.extend(child_ids);
    }

    Ok(ids)
}
