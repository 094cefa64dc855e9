use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDateTime;
use model::entities::enrollment;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace, warn};
use utoipa::ToSchema;

use crate::auth::StudentPrincipal;
use crate::handlers::courses::CourseResponse;
use crate::schemas::{ApiResponse, AppState, ErrorResponse};

/// Request body for reporting course progress
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ProgressRequest {
    /// Completion percentage; values outside [0, 100] are clamped
    pub progress: Decimal,
}

/// Enrollment response model
#[derive(Debug, Serialize, ToSchema)]
pub struct EnrollmentResponse {
    pub id: i32,
    pub course_id: i32,
    /// The enrolled course, if it still exists
    pub course: Option<CourseResponse>,
    pub enrolled_at: NaiveDateTime,
    pub progress: Decimal,
}

/// List the caller's enrollments, newest first
#[utoipa::path(
    get,
    path = "/api/v1/enrollments",
    tag = "enrollments",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Enrollments retrieved successfully", body = ApiResponse<Vec<EnrollmentResponse>>),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn list_enrollments(
    StudentPrincipal(principal): StudentPrincipal,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<EnrollmentResponse>>>, StatusCode> {
    trace!("Entering list_enrollments for user_id: {}", principal.id);

    match enrollment::Entity::find()
        .filter(enrollment::Column::UserId.eq(principal.id))
        .order_by_desc(enrollment::Column::EnrolledAt)
        .find_also_related(model::entities::course::Entity)
        .all(&state.db)
        .await
    {
        Ok(rows) => {
            let count = rows.len();
            debug!("Retrieved {} enrollments for user {}", count, principal.id);
            let data: Vec<EnrollmentResponse> = rows
                .into_iter()
                .map(|(enrollment_model, course_model)| EnrollmentResponse {
                    id: enrollment_model.id,
                    course_id: enrollment_model.course_id,
                    course: course_model.map(CourseResponse::from),
                    enrolled_at: enrollment_model.enrolled_at,
                    progress: enrollment_model.progress,
                })
                .collect();
            info!("Successfully retrieved {} enrollments", count);
            Ok(Json(ApiResponse {
                data,
                message: "Enrollments retrieved successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!(
                "Failed to list enrollments for user {}: {}",
                principal.id, db_error
            );
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Report progress on an enrolled course
#[utoipa::path(
    put,
    path = "/api/v1/enrollments/{course_id}/progress",
    tag = "enrollments",
    security(("bearer" = [])),
    params(
        ("course_id" = i32, Path, description = "Course ID"),
    ),
    request_body = ProgressRequest,
    responses(
        (status = 200, description = "Progress updated successfully", body = ApiResponse<EnrollmentResponse>),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Not enrolled in this course", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(request))]
pub async fn update_progress(
    StudentPrincipal(principal): StudentPrincipal,
    Path(course_id): Path<i32>,
    State(state): State<AppState>,
    Json(request): Json<ProgressRequest>,
) -> Result<Json<ApiResponse<EnrollmentResponse>>, (StatusCode, Json<ErrorResponse>)> {
    trace!(
        "Entering update_progress for user_id: {}, course_id: {}",
        principal.id,
        course_id
    );

    let existing = match enrollment::Entity::find()
        .filter(enrollment::Column::UserId.eq(principal.id))
        .filter(enrollment::Column::CourseId.eq(course_id))
        .one(&state.db)
        .await
    {
        Ok(Some(enrollment_model)) => enrollment_model,
        Ok(None) => {
            warn!(
                "User {} has no enrollment in course {} to update",
                principal.id, course_id
            );
            return Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("No enrollment in course {course_id}"),
                    code: "NOT_ENROLLED".to_string(),
                    success: false,
                }),
            ));
        }
        Err(db_error) => {
            error!("Failed to look up enrollment: {}", db_error);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error while updating progress".to_string(),
                    code: "DATABASE_ERROR".to_string(),
                    success: false,
                }),
            ));
        }
    };

    // Progress is a percentage; out-of-range reports are clamped, not
    // rejected.
    let clamped = request
        .progress
        .clamp(Decimal::ZERO, Decimal::from(100));
    if clamped != request.progress {
        debug!(
            "Clamped progress report {} to {} for user {}",
            request.progress, clamped, principal.id
        );
    }

    let mut enrollment_active: enrollment::ActiveModel = existing.into();
    enrollment_active.progress = Set(clamped);

    match enrollment_active.update(&state.db).await {
        Ok(updated) => {
            info!(
                "Progress for user {} in course {} set to {}",
                principal.id, course_id, updated.progress
            );
            Ok(Json(ApiResponse {
                data: EnrollmentResponse {
                    id: updated.id,
                    course_id: updated.course_id,
                    course: None,
                    enrolled_at: updated.enrolled_at,
                    progress: updated.progress,
                },
                message: "Progress updated successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to update progress: {}", db_error);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error while updating progress".to_string(),
                    code: "DATABASE_ERROR".to_string(),
                    success: false,
                }),
            ))
        }
    }
}
