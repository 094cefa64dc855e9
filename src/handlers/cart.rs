use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDateTime;
use model::entities::{cart_item, course, enrollment};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Serialize;
use tracing::{debug, error, info, instrument, trace, warn};
use utoipa::ToSchema;

use crate::auth::StudentPrincipal;
use crate::handlers::courses::CourseResponse;
use crate::schemas::{ApiResponse, AppState, ErrorResponse};

/// A single cart line
#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemResponse {
    pub id: i32,
    pub course_id: i32,
    /// The carted course, if it still exists
    pub course: Option<CourseResponse>,
    pub added_at: NaiveDateTime,
}

/// The caller's cart with its payable total
#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub items: Vec<CartItemResponse>,
    pub total: Decimal,
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

/// Get the caller's cart
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    tag = "cart",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Cart retrieved successfully", body = ApiResponse<CartResponse>),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn get_cart(
    StudentPrincipal(principal): StudentPrincipal,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CartResponse>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering get_cart for user_id: {}", principal.id);

    match cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(principal.id))
        .order_by_desc(cart_item::Column::AddedAt)
        .find_also_related(course::Entity)
        .all(&state.db)
        .await
    {
        Ok(rows) => {
            debug!("Cart of user {} holds {} items", principal.id, rows.len());
            let mut total = Decimal::ZERO;
            let items: Vec<CartItemResponse> = rows
                .into_iter()
                .map(|(item, course_model)| {
                    if let Some(course_model) = &course_model {
                        total += course_model.price;
                    }
                    CartItemResponse {
                        id: item.id,
                        course_id: item.course_id,
                        course: course_model.map(CourseResponse::from),
                        added_at: item.added_at,
                    }
                })
                .collect();

            Ok(Json(ApiResponse {
                data: CartResponse { items, total },
                message: "Cart retrieved successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to load cart for user {}: {}", principal.id, db_error);
            Err(internal("loading cart"))
        }
    }
}

/// Put a course into the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/{course_id}",
    tag = "cart",
    security(("bearer" = [])),
    params(
        ("course_id" = i32, Path, description = "Course ID"),
    ),
    responses(
        (status = 201, description = "Course added to cart", body = ApiResponse<String>),
        (status = 200, description = "Course was already in the cart", body = ApiResponse<String>),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 409, description = "Already enrolled in this course", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn add_cart_item(
    StudentPrincipal(principal): StudentPrincipal,
    Path(course_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ApiResponse<String>>), (StatusCode, Json<ErrorResponse>)> {
    trace!(
        "Entering add_cart_item for user_id: {}, course_id: {}",
        principal.id,
        course_id
    );

    match course::Entity::find_by_id(course_id).one(&state.db).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!("Course with ID {} not found for cart", course_id);
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
            return Err(internal("updating cart"));
        }
    }

    // An owned course never goes back into the cart.
    match enrollment::Entity::find()
        .filter(enrollment::Column::UserId.eq(principal.id))
        .filter(enrollment::Column::CourseId.eq(course_id))
        .one(&state.db)
        .await
    {
        Ok(Some(_)) => {
            warn!(
                "User {} tried to cart course {} they already hold",
                principal.id, course_id
            );
            return Err((
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Already enrolled in course {course_id}"),
                    code: "ALREADY_ENROLLED".to_string(),
                    success: false,
                }),
            ));
        }
        Ok(None) => {}
        Err(db_error) => {
            error!("Failed to check enrollment: {}", db_error);
            return Err(internal("updating cart"));
        }
    }

    match cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(principal.id))
        .filter(cart_item::Column::CourseId.eq(course_id))
        .one(&state.db)
        .await
    {
        Ok(Some(_)) => {
            debug!(
                "Course {} is already in the cart of user {}",
                course_id, principal.id
            );
            return Ok((
                StatusCode::OK,
                Json(ApiResponse {
                    data: format!("Course {course_id} is already in the cart"),
                    message: "Course was already in the cart".to_string(),
                    success: true,
                }),
            ));
        }
        Ok(None) => {}
        Err(db_error) => {
            error!("Failed to check cart: {}", db_error);
            return Err(internal("updating cart"));
        }
    }

    let new_item = cart_item::ActiveModel {
        user_id: Set(principal.id),
        course_id: Set(course_id),
        ..Default::default()
    };

    match new_item.insert(&state.db).await {
        Ok(_) => {
            info!("Course {} added to cart of user {}", course_id, principal.id);
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse {
                    data: format!("Course {course_id} added to cart"),
                    message: "Course added to cart".to_string(),
                    success: true,
                }),
            ))
        }
        Err(db_error) => {
            error!("Failed to add course {} to cart: {}", course_id, db_error);
            Err(internal("updating cart"))
        }
    }
}

/// Remove a course from the caller's cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/{course_id}",
    tag = "cart",
    security(("bearer" = [])),
    params(
        ("course_id" = i32, Path, description = "Course ID"),
    ),
    responses(
        (status = 200, description = "Course removed from cart", body = ApiResponse<String>),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Course was not in the cart", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn remove_cart_item(
    StudentPrincipal(principal): StudentPrincipal,
    Path(course_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<String>>, (StatusCode, Json<ErrorResponse>)> {
    trace!(
        "Entering remove_cart_item for user_id: {}, course_id: {}",
        principal.id,
        course_id
    );

    match cart_item::Entity::delete_many()
        .filter(cart_item::Column::UserId.eq(principal.id))
        .filter(cart_item::Column::CourseId.eq(course_id))
        .exec(&state.db)
        .await
    {
        Ok(delete_result) => {
            debug!(
                "Delete operation completed. Rows affected: {}",
                delete_result.rows_affected
            );
            if delete_result.rows_affected > 0 {
                info!(
                    "Course {} removed from cart of user {}",
                    course_id, principal.id
                );
                Ok(Json(ApiResponse {
                    data: format!("Course {course_id} removed from cart"),
                    message: "Course removed from cart".to_string(),
                    success: true,
                }))
            } else {
                warn!(
                    "Course {} was not in the cart of user {}",
                    course_id, principal.id
                );
                Err((
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse {
                        error: format!("Course {course_id} is not in the cart"),
                        code: "NOT_IN_CART".to_string(),
                        success: false,
                    }),
                ))
            }
        }
        Err(db_error) => {
            error!(
                "Failed to remove course {} from cart: {}",
                course_id, db_error
            );
            Err(internal("updating cart"))
        }
    }
}
