use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDateTime;
use model::entities::{course, enrollment, payment, user};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, trace, warn};
use utoipa::ToSchema;

use crate::auth::AdminPrincipal;
use crate::handlers::auth::UserResponse;
use crate::handlers::courses::CourseResponse;
use crate::handlers::payments::PaymentResponse;
use crate::schemas::{ApiResponse, AppState, CachedData};

const SUMMARY_CACHE_KEY: &str = "admin_summary";

/// A recent enrollment shown on the dashboard
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecentEnrollment {
    pub username: String,
    pub course_title: String,
    pub enrolled_at: NaiveDateTime,
}

/// A course ranked by enrollment count
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PopularCourse {
    pub course_id: i32,
    pub title: String,
    pub enrollment_count: u64,
}

/// Dashboard aggregates
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminSummary {
    pub student_count: u64,
    pub course_count: u64,
    pub enrollment_count: u64,
    /// Sum over all successful payment rows
    pub total_revenue: Decimal,
    pub recent_enrollments: Vec<RecentEnrollment>,
    pub popular_courses: Vec<PopularCourse>,
}

/// A student with their enrollments and payments
#[derive(Debug, Serialize, ToSchema)]
pub struct StudentDetailResponse {
    pub user: UserResponse,
    pub enrollments: Vec<StudentEnrollment>,
    pub payments: Vec<PaymentResponse>,
}

/// One enrollment line of a student detail view
#[derive(Debug, Serialize, ToSchema)]
pub struct StudentEnrollment {
    pub course: Option<CourseResponse>,
    pub enrolled_at: NaiveDateTime,
    pub progress: Decimal,
}

async fn build_summary(state: &AppState) -> Result<AdminSummary, sea_orm::DbErr> {
    let student_count = user::Entity::find()
        .filter(user::Column::IsAdmin.eq(false))
        .count(&state.db)
        .await?;
    let course_count = course::Entity::find().count(&state.db).await?;
    let enrollment_count = enrollment::Entity::find().count(&state.db).await?;

    let total_revenue = payment::Entity::find()
        .filter(payment::Column::Status.eq(payment::PaymentStatus::Success))
        .all(&state.db)
        .await?
        .iter()
        .map(|row| row.amount)
        .sum::<Decimal>();

    // Last five enrollments with student and course names.
    let recent_rows = enrollment::Entity::find()
        .order_by_desc(enrollment::Column::EnrolledAt)
        .limit(5)
        .find_also_related(course::Entity)
        .all(&state.db)
        .await?;
    let user_ids: Vec<i32> = recent_rows.iter().map(|(e, _)| e.user_id).collect();
    let users_by_id: HashMap<i32, String> = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();
    let recent_enrollments = recent_rows
        .into_iter()
        .map(|(enrollment_model, course_model)| RecentEnrollment {
            username: users_by_id
                .get(&enrollment_model.user_id)
                .cloned()
                .unwrap_or_else(|| format!("user {}", enrollment_model.user_id)),
            course_title: course_model
                .map(|c| c.title)
                .unwrap_or_else(|| format!("course {}", enrollment_model.course_id)),
            enrolled_at: enrollment_model.enrolled_at,
        })
        .collect();

    // Top five courses by enrollment count.
    let mut counts: HashMap<i32, u64> = HashMap::new();
    for row in enrollment::Entity::find().all(&state.db).await? {
        *counts.entry(row.course_id).or_insert(0) += 1;
    }
    let titles_by_id: HashMap<i32, String> = course::Entity::find()
        .filter(course::Column::Id.is_in(counts.keys().copied().collect::<Vec<_>>()))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|c| (c.id, c.title))
        .collect();
    let mut popular_courses: Vec<PopularCourse> = counts
        .into_iter()
        .filter_map(|(course_id, enrollment_count)| {
            titles_by_id.get(&course_id).map(|title| PopularCourse {
                course_id,
                title: title.clone(),
                enrollment_count,
            })
        })
        .collect();
    popular_courses.sort_by(|a, b| {
        b.enrollment_count
            .cmp(&a.enrollment_count)
            .then(a.course_id.cmp(&b.course_id))
    });
    popular_courses.truncate(5);

    Ok(AdminSummary {
        student_count,
        course_count,
        enrollment_count,
        total_revenue,
        recent_enrollments,
        popular_courses,
    })
}

/// Dashboard summary (admin only)
#[utoipa::path(
    get,
    path = "/api/v1/admin/summary",
    tag = "admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Summary retrieved successfully", body = ApiResponse<AdminSummary>),
        (status = 403, description = "Administrator access required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn get_summary(
    _admin: AdminPrincipal,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AdminSummary>>, StatusCode> {
    trace!("Entering get_summary function");

    // Check cache first
    if let Some(CachedData::Summary(summary)) = state.cache.get(SUMMARY_CACHE_KEY).await {
        debug!("Dashboard summary served from cache");
        return Ok(Json(ApiResponse {
            data: summary,
            message: "Summary retrieved from cache".to_string(),
            success: true,
        }));
    }

    let summary = match build_summary(&state).await {
        Ok(summary) => summary,
        Err(db_error) => {
            error!("Failed to build dashboard summary: {}", db_error);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    state
        .cache
        .insert(
            SUMMARY_CACHE_KEY.to_string(),
            CachedData::Summary(summary.clone()),
        )
        .await;

    info!(
        "Dashboard summary built: {} students, {} courses, {} enrollments",
        summary.student_count, summary.course_count, summary.enrollment_count
    );
    Ok(Json(ApiResponse {
        data: summary,
        message: "Summary retrieved successfully".to_string(),
        success: true,
    }))
}

/// List all student accounts (admin only)
#[utoipa::path(
    get,
    path = "/api/v1/admin/students",
    tag = "admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Students retrieved successfully", body = ApiResponse<Vec<UserResponse>>),
        (status = 403, description = "Administrator access required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn list_students(
    _admin: AdminPrincipal,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, StatusCode> {
    trace!("Entering list_students function");

    match user::Entity::find()
        .filter(user::Column::IsAdmin.eq(false))
        .order_by_desc(user::Column::CreatedAt)
        .all(&state.db)
        .await
    {
        Ok(users) => {
            let count = users.len();
            debug!("Retrieved {} students", count);
            let data: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
            info!("Successfully retrieved {} students", count);
            Ok(Json(ApiResponse {
                data,
                message: "Students retrieved successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to list students: {}", db_error);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Get a student's profile with enrollments and payments (admin only)
#[utoipa::path(
    get,
    path = "/api/v1/admin/students/{user_id}",
    tag = "admin",
    security(("bearer" = [])),
    params(
        ("user_id" = i32, Path, description = "Student user ID"),
    ),
    responses(
        (status = 200, description = "Student retrieved successfully", body = ApiResponse<StudentDetailResponse>),
        (status = 403, description = "Administrator access required", body = ErrorResponse),
        (status = 404, description = "Student not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn get_student(
    _admin: AdminPrincipal,
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StudentDetailResponse>>, StatusCode> {
    trace!("Entering get_student function for user_id: {}", user_id);

    let user_model = match user::Entity::find_by_id(user_id).one(&state.db).await {
        Ok(Some(user_model)) if !user_model.is_admin => user_model,
        Ok(_) => {
            warn!("Student with ID {} not found", user_id);
            return Err(StatusCode::NOT_FOUND);
        }
        Err(db_error) => {
            error!("Failed to look up student {}: {}", user_id, db_error);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let enrollments = match enrollment::Entity::find()
        .filter(enrollment::Column::UserId.eq(user_id))
        .order_by_desc(enrollment::Column::EnrolledAt)
        .find_also_related(course::Entity)
        .all(&state.db)
        .await
    {
        Ok(rows) => rows
            .into_iter()
            .map(|(enrollment_model, course_model)| StudentEnrollment {
                course: course_model.map(CourseResponse::from),
                enrolled_at: enrollment_model.enrolled_at,
                progress: enrollment_model.progress,
            })
            .collect(),
        Err(db_error) => {
            error!("Failed to list enrollments of student {}: {}", user_id, db_error);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let payments = match payment::Entity::find()
        .filter(payment::Column::UserId.eq(user_id))
        .order_by_desc(payment::Column::CreatedAt)
        .all(&state.db)
        .await
    {
        Ok(rows) => rows.into_iter().map(PaymentResponse::from).collect(),
        Err(db_error) => {
            error!("Failed to list payments of student {}: {}", user_id, db_error);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    info!("Student {} detail retrieved", user_id);
    Ok(Json(ApiResponse {
        data: StudentDetailResponse {
            user: UserResponse::from(user_model),
            enrollments,
            payments,
        },
        message: "Student retrieved successfully".to_string(),
        success: true,
    }))
}
