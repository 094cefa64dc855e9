use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDateTime;
use model::entities::{content, course, enrollment};
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace, warn};
use utoipa::ToSchema;

use crate::auth::{AdminPrincipal, Principal};
use crate::schemas::{ApiResponse, AppState, ErrorResponse};

/// Content response model
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ContentResponse {
    pub id: i32,
    pub course_id: i32,
    pub title: String,
    /// "video", "pdf" or "presentation"
    pub kind: String,
    pub file_path: String,
    pub display_order: i32,
    pub created_at: NaiveDateTime,
}

impl From<content::Model> for ContentResponse {
    fn from(model: content::Model) -> Self {
        Self {
            id: model.id,
            course_id: model.course_id,
            title: model.title,
            kind: model.kind.to_value(),
            file_path: model.file_path,
            display_order: model.display_order,
            created_at: model.created_at,
        }
    }
}

fn error_body(status: StatusCode, error: String, code: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
            success: false,
        }),
    )
}

fn internal(what: &str) -> (StatusCode, Json<ErrorResponse>) {
    error_body(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Internal server error while {what}"),
        "DATABASE_ERROR",
    )
}

/// Course material is visible to administrators and enrolled students only.
async fn can_access_course(
    db: &DatabaseConnection,
    principal: &Principal,
    course_id: i32,
) -> Result<bool, sea_orm::DbErr> {
    if principal.is_admin {
        return Ok(true);
    }
    let enrolled = enrollment::Entity::find()
        .filter(enrollment::Column::UserId.eq(principal.id))
        .filter(enrollment::Column::CourseId.eq(course_id))
        .one(db)
        .await?
        .is_some();
    Ok(enrolled)
}

/// List the content of a course, in display order
#[utoipa::path(
    get,
    path = "/api/v1/courses/{course_id}/content",
    tag = "content",
    security(("bearer" = [])),
    params(
        ("course_id" = i32, Path, description = "Course ID"),
    ),
    responses(
        (status = 200, description = "Content retrieved successfully", body = ApiResponse<Vec<ContentResponse>>),
        (status = 403, description = "Not enrolled in this course", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn list_course_content(
    principal: Principal,
    Path(course_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ContentResponse>>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering list_course_content for course_id: {}", course_id);

    match course::Entity::find_by_id(course_id).one(&state.db).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!("Course with ID {} not found", course_id);
            return Err(error_body(
                StatusCode::NOT_FOUND,
                format!("Course {course_id} not found"),
                "COURSE_NOT_FOUND",
            ));
        }
        Err(db_error) => {
            error!("Failed to look up course {}: {}", course_id, db_error);
            return Err(internal("listing content"));
        }
    }

    match can_access_course(&state.db, &principal, course_id).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                "User {} is not enrolled in course {} and asked for its content",
                principal.id, course_id
            );
            return Err(error_body(
                StatusCode::FORBIDDEN,
                "Enroll in this course to access its content".to_string(),
                "NOT_ENROLLED",
            ));
        }
        Err(db_error) => {
            error!("Failed to check enrollment: {}", db_error);
            return Err(internal("listing content"));
        }
    }

    match content::Entity::find()
        .filter(content::Column::CourseId.eq(course_id))
        .order_by_asc(content::Column::DisplayOrder)
        .order_by_asc(content::Column::CreatedAt)
        .all(&state.db)
        .await
    {
        Ok(rows) => {
            debug!("Retrieved {} content rows for course {}", rows.len(), course_id);
            let data: Vec<ContentResponse> = rows.into_iter().map(ContentResponse::from).collect();
            Ok(Json(ApiResponse {
                data,
                message: "Content retrieved successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to list content of course {}: {}", course_id, db_error);
            Err(internal("listing content"))
        }
    }
}

/// Upload a content file into a course (admin only)
#[utoipa::path(
    post,
    path = "/api/v1/courses/{course_id}/content",
    tag = "content",
    security(("bearer" = [])),
    params(
        ("course_id" = i32, Path, description = "Course ID"),
    ),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Content uploaded successfully", body = ApiResponse<ContentResponse>),
        (status = 400, description = "Missing field or unsupported file type", body = ErrorResponse),
        (status = 403, description = "Administrator access required", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(multipart))]
pub async fn upload_content(
    _admin: AdminPrincipal,
    Path(course_id): Path<i32>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<ContentResponse>>), (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering upload_content for course_id: {}", course_id);

    match course::Entity::find_by_id(course_id).one(&state.db).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!("Course with ID {} not found for upload", course_id);
            return Err(error_body(
                StatusCode::NOT_FOUND,
                format!("Course {course_id} not found"),
                "COURSE_NOT_FOUND",
            ));
        }
        Err(db_error) => {
            error!("Failed to look up course {}: {}", course_id, db_error);
            return Err(internal("uploading content"));
        }
    }

    let mut title: Option<String> = None;
    let mut kind_raw: Option<String> = None;
    let mut display_order: i32 = 0;
    let mut upload: Option<(String, Vec<u8>)> = None;

    let malformed = |what: &str| {
        error_body(
            StatusCode::BAD_REQUEST,
            what.to_string(),
            "INVALID_MULTIPART",
        )
    };

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed multipart body: {}", e);
        malformed("Malformed multipart body")
    })? {
        match field.name() {
            Some("title") => {
                title = Some(field.text().await.map_err(|e| {
                    warn!("Failed to read title field: {}", e);
                    malformed("Failed to read title field")
                })?);
            }
            Some("kind") => {
                kind_raw = Some(field.text().await.map_err(|e| {
                    warn!("Failed to read kind field: {}", e);
                    malformed("Failed to read kind field")
                })?);
            }
            Some("display_order") => {
                let raw = field.text().await.map_err(|e| {
                    warn!("Failed to read display_order field: {}", e);
                    malformed("Failed to read display_order field")
                })?;
                display_order = raw.trim().parse().map_err(|_| {
                    error_body(
                        StatusCode::BAD_REQUEST,
                        format!("display_order '{raw}' is not an integer"),
                        "INVALID_DISPLAY_ORDER",
                    )
                })?;
            }
            Some("file") => {
                let file_name = field.file_name().map(|n| n.to_string()).ok_or_else(|| {
                    error_body(
                        StatusCode::BAD_REQUEST,
                        "File field has no file name".to_string(),
                        "MISSING_FILE",
                    )
                })?;
                let bytes = field.bytes().await.map_err(|e| {
                    warn!("Failed to read uploaded file: {}", e);
                    malformed("Failed to read uploaded file")
                })?;
                upload = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let title = title.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
        error_body(
            StatusCode::BAD_REQUEST,
            "Missing 'title' field".to_string(),
            "MISSING_TITLE",
        )
    })?;
    let kind_raw = kind_raw.ok_or_else(|| {
        error_body(
            StatusCode::BAD_REQUEST,
            "Missing 'kind' field".to_string(),
            "MISSING_KIND",
        )
    })?;
    let kind = content::ContentKind::try_from_value(&kind_raw).map_err(|_| {
        error_body(
            StatusCode::BAD_REQUEST,
            format!("Unknown content kind '{kind_raw}'"),
            "INVALID_KIND",
        )
    })?;
    let (file_name, bytes) = upload.ok_or_else(|| {
        error_body(
            StatusCode::BAD_REQUEST,
            "Missing 'file' field".to_string(),
            "MISSING_FILE",
        )
    })?;

    let stored = state.store.save(kind, &file_name, &bytes).map_err(|e| {
        warn!("Rejected upload '{}': {}", file_name, e);
        error_body(StatusCode::BAD_REQUEST, e.to_string(), "UNSUPPORTED_FILE")
    })?;

    let new_content = content::ActiveModel {
        course_id: Set(course_id),
        title: Set(title.clone()),
        kind: Set(kind),
        file_path: Set(stored.clone()),
        display_order: Set(display_order),
        ..Default::default()
    };

    match new_content.insert(&state.db).await {
        Ok(content_model) => {
            info!(
                "Content '{}' uploaded to course {} as {}",
                title, course_id, stored
            );
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse {
                    data: ContentResponse::from(content_model),
                    message: "Content uploaded successfully".to_string(),
                    success: true,
                }),
            ))
        }
        Err(db_error) => {
            error!("Failed to persist content row: {}", db_error);
            // Do not leave the stored file orphaned.
            if let Err(storage_error) = state.store.remove(&stored) {
                error!("Failed to clean up stored file {}: {}", stored, storage_error);
            }
            Err(internal("uploading content"))
        }
    }
}

/// Delete a content item and its stored file (admin only)
#[utoipa::path(
    delete,
    path = "/api/v1/content/{content_id}",
    tag = "content",
    security(("bearer" = [])),
    params(
        ("content_id" = i32, Path, description = "Content ID"),
    ),
    responses(
        (status = 200, description = "Content deleted successfully", body = ApiResponse<String>),
        (status = 403, description = "Administrator access required", body = ErrorResponse),
        (status = 404, description = "Content not found", body = ErrorResponse),
        (status = 500, description = "File removal or database failure", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn delete_content(
    _admin: AdminPrincipal,
    Path(content_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<String>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering delete_content for content_id: {}", content_id);

    let existing = match content::Entity::find_by_id(content_id).one(&state.db).await {
        Ok(Some(content_model)) => content_model,
        Ok(None) => {
            warn!("Content with ID {} not found for deletion", content_id);
            return Err(error_body(
                StatusCode::NOT_FOUND,
                format!("Content {content_id} not found"),
                "CONTENT_NOT_FOUND",
            ));
        }
        Err(db_error) => {
            error!("Failed to look up content {}: {}", content_id, db_error);
            return Err(internal("deleting content"));
        }
    };

    match state.store.remove(&existing.file_path) {
        Ok(outcome) => {
            debug!("File removal outcome for {}: {:?}", existing.file_path, outcome);
        }
        Err(storage_error) => {
            error!(
                "Failed to remove stored file {}: {}",
                existing.file_path, storage_error
            );
            return Err(error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to remove stored file {}", existing.file_path),
                "FILE_REMOVAL_FAILED",
            ));
        }
    }

    match content::Entity::delete_by_id(content_id).exec(&state.db).await {
        Ok(_) => {
            info!("Content {} deleted", content_id);
            Ok(Json(ApiResponse {
                data: format!("Content {content_id} deleted"),
                message: "Content deleted successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to delete content {}: {}", content_id, db_error);
            Err(internal("deleting content"))
        }
    }
}

/// Download a PDF or presentation file (enrolled students and admins)
///
/// Video lectures are stream-only course material and cannot be downloaded.
#[utoipa::path(
    get,
    path = "/api/v1/content/{content_id}/download",
    tag = "content",
    security(("bearer" = [])),
    params(
        ("content_id" = i32, Path, description = "Content ID"),
    ),
    responses(
        (status = 200, description = "File bytes", content_type = "application/octet-stream"),
        (status = 403, description = "Not enrolled, or the item is a video", body = ErrorResponse),
        (status = 404, description = "Content not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn download_content(
    principal: Principal,
    Path(content_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering download_content for content_id: {}", content_id);

    let content_model = match content::Entity::find_by_id(content_id).one(&state.db).await {
        Ok(Some(content_model)) => content_model,
        Ok(None) => {
            warn!("Content with ID {} not found", content_id);
            return Err(error_body(
                StatusCode::NOT_FOUND,
                format!("Content {content_id} not found"),
                "CONTENT_NOT_FOUND",
            ));
        }
        Err(db_error) => {
            error!("Failed to look up content {}: {}", content_id, db_error);
            return Err(internal("downloading content"));
        }
    };

    match can_access_course(&state.db, &principal, content_model.course_id).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                "User {} asked to download content {} without enrollment",
                principal.id, content_id
            );
            return Err(error_body(
                StatusCode::FORBIDDEN,
                "Enroll in this course to download its material".to_string(),
                "NOT_ENROLLED",
            ));
        }
        Err(db_error) => {
            error!("Failed to check enrollment: {}", db_error);
            return Err(internal("downloading content"));
        }
    }

    if content_model.kind == content::ContentKind::Video {
        warn!("Download refused for video content {}", content_id);
        return Err(error_body(
            StatusCode::FORBIDDEN,
            "Video lectures cannot be downloaded".to_string(),
            "VIDEO_NOT_DOWNLOADABLE",
        ));
    }

    let bytes = state.store.read(&content_model.file_path).map_err(|e| {
        error!(
            "Failed to read stored file {}: {}",
            content_model.file_path, e
        );
        error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Stored file is unavailable".to_string(),
            "FILE_READ_FAILED",
        )
    })?;

    let file_name = content_model
        .file_path
        .rsplit('/')
        .next()
        .unwrap_or("download")
        .to_string();

    info!("User {} downloads content {}", principal.id, content_id);
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
