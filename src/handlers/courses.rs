use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use axum_valid::Valid;
use chrono::NaiveDateTime;
use model::entities::{content, course};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::AdminPrincipal;
use crate::schemas::{ApiResponse, AppState, ErrorResponse};

/// Request body for creating a course
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    /// Price in the gateway's currency; must not be negative
    pub price: Decimal,
    /// One of the fixed category names (e.g. "general", "science")
    pub category: String,
    /// Optional instructor user id
    pub instructor_id: Option<i32>,
}

/// Request body for updating a course
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
    pub instructor_id: Option<i32>,
}

/// Query parameters for the course catalog
#[derive(Debug, Deserialize, ToSchema)]
pub struct CourseListQuery {
    /// Free-text search over title and description
    pub q: Option<String>,
    /// Filter by category name
    pub category: Option<String>,
}

/// Course response model
#[derive(Debug, Serialize, ToSchema)]
pub struct CourseResponse {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category: String,
    pub thumbnail: Option<String>,
    pub instructor_id: Option<i32>,
    pub created_at: NaiveDateTime,
}

impl From<course::Model> for CourseResponse {
    fn from(model: course::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            price: model.price,
            category: model.category.to_value(),
            thumbnail: model.thumbnail,
            instructor_id: model.instructor_id,
            created_at: model.created_at,
        }
    }
}

fn bad_request(error: String, code: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
            success: false,
        }),
    )
}

fn internal(what: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("Internal server error while {what}"),
            code: "DATABASE_ERROR".to_string(),
            success: false,
        }),
    )
}

fn parse_category(raw: &str) -> Result<course::CourseCategory, (StatusCode, Json<ErrorResponse>)> {
    course::CourseCategory::try_from_value(&raw.to_string()).map_err(|_| {
        bad_request(
            format!("Unknown category '{raw}'"),
            "INVALID_CATEGORY",
        )
    })
}

/// List the course catalog
#[utoipa::path(
    get,
    path = "/api/v1/courses",
    tag = "courses",
    params(
        ("q" = Option<String>, Query, description = "Free-text search over title and description"),
        ("category" = Option<String>, Query, description = "Filter by category name"),
    ),
    responses(
        (status = 200, description = "Courses retrieved successfully", body = ApiResponse<Vec<CourseResponse>>),
        (status = 400, description = "Unknown category", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn list_courses(
    Query(query): Query<CourseListQuery>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<CourseResponse>>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering list_courses function");

    let mut finder = course::Entity::find().order_by_desc(course::Column::CreatedAt);

    if let Some(q) = query.q.as_deref().filter(|q| !q.trim().is_empty()) {
        debug!("Searching catalog for '{}'", q);
        finder = finder.filter(
            Condition::any()
                .add(course::Column::Title.contains(q))
                .add(course::Column::Description.contains(q)),
        );
    }

    if let Some(raw) = query.category.as_deref() {
        let category = parse_category(raw)?;
        debug!("Filtering catalog by category {:?}", category);
        finder = finder.filter(course::Column::Category.eq(category));
    }

    match finder.all(&state.db).await {
        Ok(courses) => {
            let count = courses.len();
            debug!("Retrieved {} courses from catalog", count);
            let data: Vec<CourseResponse> = courses.into_iter().map(CourseResponse::from).collect();
            info!("Successfully retrieved {} courses", count);
            Ok(Json(ApiResponse {
                data,
                message: "Courses retrieved successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to retrieve courses: {}", db_error);
            Err(internal("listing courses"))
        }
    }
}

/// Get a specific course by ID
#[utoipa::path(
    get,
    path = "/api/v1/courses/{course_id}",
    tag = "courses",
    params(
        ("course_id" = i32, Path, description = "Course ID"),
    ),
    responses(
        (status = 200, description = "Course retrieved successfully", body = ApiResponse<CourseResponse>),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn get_course(
    Path(course_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CourseResponse>>, StatusCode> {
    trace!("Entering get_course function for course_id: {}", course_id);

    match course::Entity::find_by_id(course_id).one(&state.db).await {
        Ok(Some(course_model)) => {
            info!("Successfully retrieved course {}", course_model.id);
            Ok(Json(ApiResponse {
                data: CourseResponse::from(course_model),
                message: "Course retrieved successfully".to_string(),
                success: true,
            }))
        }
        Ok(None) => {
            warn!("Course with ID {} not found", course_id);
            Err(StatusCode::NOT_FOUND)
        }
        Err(db_error) => {
            error!("Failed to retrieve course {}: {}", course_id, db_error);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Create a new course (admin only)
#[utoipa::path(
    post,
    path = "/api/v1/courses",
    tag = "courses",
    security(("bearer" = [])),
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Course created successfully", body = ApiResponse<CourseResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Administrator access required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(request))]
pub async fn create_course(
    _admin: AdminPrincipal,
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<CreateCourseRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<CourseResponse>>), (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering create_course function");
    debug!("Creating course with title: {}", request.title);

    if request.price < Decimal::ZERO {
        return Err(bad_request(
            "Price must not be negative".to_string(),
            "NEGATIVE_PRICE",
        ));
    }
    let category = parse_category(&request.category)?;

    let new_course = course::ActiveModel {
        title: Set(request.title.clone()),
        description: Set(request.description),
        price: Set(request.price),
        category: Set(category),
        instructor_id: Set(request.instructor_id),
        ..Default::default()
    };

    match new_course.insert(&state.db).await {
        Ok(course_model) => {
            info!(
                "Course created successfully with ID: {}, title: {}",
                course_model.id, course_model.title
            );
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse {
                    data: CourseResponse::from(course_model),
                    message: "Course created successfully".to_string(),
                    success: true,
                }),
            ))
        }
        Err(db_error) => {
            error!("Failed to create course '{}': {}", request.title, db_error);
            Err(internal("creating course"))
        }
    }
}

/// Update a course (admin only)
#[utoipa::path(
    put,
    path = "/api/v1/courses/{course_id}",
    tag = "courses",
    security(("bearer" = [])),
    params(
        ("course_id" = i32, Path, description = "Course ID"),
    ),
    request_body = UpdateCourseRequest,
    responses(
        (status = 200, description = "Course updated successfully", body = ApiResponse<CourseResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Administrator access required", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(request))]
pub async fn update_course(
    _admin: AdminPrincipal,
    Path(course_id): Path<i32>,
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<UpdateCourseRequest>>,
) -> Result<Json<ApiResponse<CourseResponse>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering update_course function for course_id: {}", course_id);

    let existing = match course::Entity::find_by_id(course_id).one(&state.db).await {
        Ok(Some(course_model)) => course_model,
        Ok(None) => {
            warn!("Course with ID {} not found for update", course_id);
            return Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Course {course_id} not found"),
                    code: "COURSE_NOT_FOUND".to_string(),
                    success: false,
                }),
            ));
        }
        Err(db_error) => {
            error!("Failed to look up course {} for update: {}", course_id, db_error);
            return Err(internal("updating course"));
        }
    };

    let mut course_active: course::ActiveModel = existing.into();
    if let Some(title) = request.title {
        debug!("Updating title to: {}", title);
        course_active.title = Set(title);
    }
    if let Some(description) = request.description {
        course_active.description = Set(Some(description));
    }
    if let Some(price) = request.price {
        if price < Decimal::ZERO {
            return Err(bad_request(
                "Price must not be negative".to_string(),
                "NEGATIVE_PRICE",
            ));
        }
        debug!("Updating price to: {}", price);
        course_active.price = Set(price);
    }
    if let Some(raw) = request.category {
        course_active.category = Set(parse_category(&raw)?);
    }
    if let Some(instructor_id) = request.instructor_id {
        course_active.instructor_id = Set(Some(instructor_id));
    }

    match course_active.update(&state.db).await {
        Ok(updated) => {
            info!("Course {} updated successfully", updated.id);
            Ok(Json(ApiResponse {
                data: CourseResponse::from(updated),
                message: "Course updated successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to update course {}: {}", course_id, db_error);
            Err(internal("updating course"))
        }
    }
}

/// Delete a course and its stored content files (admin only)
#[utoipa::path(
    delete,
    path = "/api/v1/courses/{course_id}",
    tag = "courses",
    security(("bearer" = [])),
    params(
        ("course_id" = i32, Path, description = "Course ID"),
    ),
    responses(
        (status = 200, description = "Course deleted successfully", body = ApiResponse<String>),
        (status = 403, description = "Administrator access required", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "File removal or database failure", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn delete_course(
    _admin: AdminPrincipal,
    Path(course_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<String>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering delete_course function for course_id: {}", course_id);

    let existing = match course::Entity::find_by_id(course_id).one(&state.db).await {
        Ok(Some(course_model)) => course_model,
        Ok(None) => {
            warn!("Course with ID {} not found for deletion", course_id);
            return Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Course {course_id} not found"),
                    code: "COURSE_NOT_FOUND".to_string(),
                    success: false,
                }),
            ));
        }
        Err(db_error) => {
            error!("Failed to look up course {} for deletion: {}", course_id, db_error);
            return Err(internal("deleting course"));
        }
    };

    // Remove stored files before touching the database rows; an I/O fault
    // aborts the whole deletion so nothing is half-gone.
    let content_rows = match content::Entity::find()
        .filter(content::Column::CourseId.eq(course_id))
        .all(&state.db)
        .await
    {
        Ok(rows) => rows,
        Err(db_error) => {
            error!("Failed to list content of course {}: {}", course_id, db_error);
            return Err(internal("deleting course"));
        }
    };

    for row in &content_rows {
        if let Err(storage_error) = state.store.remove(&row.file_path) {
            error!(
                "Failed to remove stored file {} of course {}: {}",
                row.file_path, course_id, storage_error
            );
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to remove stored file {}", row.file_path),
                    code: "FILE_REMOVAL_FAILED".to_string(),
                    success: false,
                }),
            ));
        }
    }
    if let Some(thumbnail) = &existing.thumbnail {
        if let Err(storage_error) = state.store.remove(thumbnail) {
            error!(
                "Failed to remove thumbnail {} of course {}: {}",
                thumbnail, course_id, storage_error
            );
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to remove thumbnail {thumbnail}"),
                    code: "FILE_REMOVAL_FAILED".to_string(),
                    success: false,
                }),
            ));
        }
    }

    // Content, enrollments, payments and cart rows cascade with the course.
    match course::Entity::delete_by_id(course_id).exec(&state.db).await {
        Ok(delete_result) => {
            debug!(
                "Delete operation completed. Rows affected: {}",
                delete_result.rows_affected
            );
            info!(
                "Course {} deleted with {} content files",
                course_id,
                content_rows.len()
            );
            Ok(Json(ApiResponse {
                data: format!("Course {course_id} deleted"),
                message: "Course deleted successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to delete course {}: {}", course_id, db_error);
            Err(internal("deleting course"))
        }
    }
}

/// Upload or replace a course thumbnail (admin only)
#[utoipa::path(
    post,
    path = "/api/v1/courses/{course_id}/thumbnail",
    tag = "courses",
    security(("bearer" = [])),
    params(
        ("course_id" = i32, Path, description = "Course ID"),
    ),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Thumbnail stored successfully", body = ApiResponse<CourseResponse>),
        (status = 400, description = "Missing file or unsupported image type", body = ErrorResponse),
        (status = 403, description = "Administrator access required", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(multipart))]
pub async fn upload_thumbnail(
    _admin: AdminPrincipal,
    Path(course_id): Path<i32>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<CourseResponse>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering upload_thumbnail for course_id: {}", course_id);

    let existing = match course::Entity::find_by_id(course_id).one(&state.db).await {
        Ok(Some(course_model)) => course_model,
        Ok(None) => {
            warn!("Course with ID {} not found for thumbnail upload", course_id);
            return Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Course {course_id} not found"),
                    code: "COURSE_NOT_FOUND".to_string(),
                    success: false,
                }),
            ));
        }
        Err(db_error) => {
            error!("Failed to look up course {}: {}", course_id, db_error);
            return Err(internal("storing thumbnail"));
        }
    };

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed multipart body: {}", e);
        bad_request("Malformed multipart body".to_string(), "INVALID_MULTIPART")
    })? {
        if field.name() == Some("file") {
            let file_name = field
                .file_name()
                .map(|n| n.to_string())
                .ok_or_else(|| {
                    bad_request("File field has no file name".to_string(), "MISSING_FILE")
                })?;
            let bytes = field.bytes().await.map_err(|e| {
                warn!("Failed to read uploaded file: {}", e);
                bad_request("Failed to read uploaded file".to_string(), "INVALID_MULTIPART")
            })?;
            upload = Some((file_name, bytes.to_vec()));
        }
    }

    let (file_name, bytes) = upload.ok_or_else(|| {
        bad_request("Missing 'file' field".to_string(), "MISSING_FILE")
    })?;

    let stored = state.store.save_image(&file_name, &bytes).map_err(|e| {
        warn!("Rejected thumbnail upload '{}': {}", file_name, e);
        bad_request(e.to_string(), "UNSUPPORTED_FILE")
    })?;

    // Drop the previous thumbnail; already-absent is fine.
    if let Some(old) = &existing.thumbnail {
        if let Err(storage_error) = state.store.remove(old) {
            error!("Failed to remove previous thumbnail {}: {}", old, storage_error);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to remove previous thumbnail {old}"),
                    code: "FILE_REMOVAL_FAILED".to_string(),
                    success: false,
                }),
            ));
        }
    }

    let mut course_active: course::ActiveModel = existing.into();
    course_active.thumbnail = Set(Some(stored));

    match course_active.update(&state.db).await {
        Ok(updated) => {
            info!("Thumbnail stored for course {}", updated.id);
            Ok(Json(ApiResponse {
                data: CourseResponse::from(updated),
                message: "Thumbnail stored successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to persist thumbnail for course {}: {}", course_id, db_error);
            Err(internal("storing thumbnail"))
        }
    }
}
