use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use checkout::gateway::RedirectForm;
use checkout::{begin_cart_checkout, begin_course_checkout, confirm_success, mark_failure};
use checkout::{CheckoutError, CheckoutIntent};
use chrono::NaiveDateTime;
use model::entities::payment;
use rust_decimal::Decimal;
use sea_orm::{ActiveEnum, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, error, info, instrument, trace, warn};
use utoipa::ToSchema;

use crate::auth::{Principal, StudentPrincipal};
use crate::schemas::{ApiResponse, AppState, ErrorResponse};

/// Everything the client needs to hand the buyer over to the gateway
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub transaction_id: String,
    pub total: Decimal,
    /// Gateway page the redirect form must be posted to
    pub gateway_url: String,
    /// Hidden form fields for the gateway redirect
    #[schema(value_type = Object)]
    pub form: RedirectForm,
}

/// Query parameters of the gateway's success redirect
#[derive(Debug, Deserialize, ToSchema)]
pub struct SuccessCallback {
    /// Transaction id (order id)
    pub oid: Option<String>,
    /// Paid amount as reported by the gateway
    pub amt: Option<String>,
    /// Gateway reference id
    #[serde(rename = "refId")]
    pub ref_id: Option<String>,
}

/// Query parameters of the gateway's failure redirect
#[derive(Debug, Deserialize, ToSchema)]
pub struct FailureCallback {
    /// Transaction id
    pub pid: Option<String>,
}

/// Server-to-server verification request
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct VerifyRequest {
    /// Transaction id
    pub pid: String,
    /// Paid amount
    pub amt: Decimal,
    /// Gateway reference id
    pub rid: String,
}

/// What a settled transaction changed
#[derive(Debug, Serialize, ToSchema)]
pub struct SettlementResponse {
    pub transaction_id: String,
    pub enrolled_courses: Vec<i32>,
    pub total: Decimal,
}

/// Payment history row
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: i32,
    pub user_id: i32,
    pub course_id: i32,
    pub amount: Decimal,
    pub transaction_id: String,
    /// "pending", "success" or "failed"
    pub status: String,
    pub created_at: NaiveDateTime,
}

impl From<payment::Model> for PaymentResponse {
    fn from(model: payment::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            course_id: model.course_id,
            amount: model.amount,
            transaction_id: model.transaction_id,
            status: model.status.to_value(),
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

fn checkout_error(err: CheckoutError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        CheckoutError::CourseNotFound(course_id) => error_body(
            StatusCode::NOT_FOUND,
            format!("Course {course_id} not found"),
            "COURSE_NOT_FOUND",
        ),
        CheckoutError::AlreadyEnrolled(course_id) => error_body(
            StatusCode::CONFLICT,
            format!("Already enrolled in course {course_id}"),
            "ALREADY_ENROLLED",
        ),
        CheckoutError::EmptyCheckout => error_body(
            StatusCode::BAD_REQUEST,
            "Nothing to check out".to_string(),
            "EMPTY_CHECKOUT",
        ),
        CheckoutError::InvalidCallback(detail) => error_body(
            StatusCode::BAD_REQUEST,
            format!("Invalid callback: {detail}"),
            "INVALID_CALLBACK",
        ),
        CheckoutError::VerificationFailed(transaction_id) => error_body(
            StatusCode::PAYMENT_REQUIRED,
            format!("Payment verification failed for transaction {transaction_id}"),
            "VERIFICATION_FAILED",
        ),
        CheckoutError::AlreadyProcessed(_) | CheckoutError::Gateway(_) | CheckoutError::Database(_) => {
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error during checkout".to_string(),
                "CHECKOUT_ERROR",
            )
        }
    }
}

fn checkout_response(intent: CheckoutIntent, state: &AppState) -> CheckoutResponse {
    let form = RedirectForm::build(&intent, &state.config.gateway);
    CheckoutResponse {
        transaction_id: intent.transaction_id,
        total: intent.total,
        gateway_url: state.config.gateway.checkout_url.clone(),
        form,
    }
}

/// Start a checkout for a single course
#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout/{course_id}",
    tag = "payments",
    security(("bearer" = [])),
    params(
        ("course_id" = i32, Path, description = "Course ID"),
    ),
    responses(
        (status = 201, description = "Checkout started", body = ApiResponse<CheckoutResponse>),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 409, description = "Already enrolled", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn checkout_course(
    StudentPrincipal(principal): StudentPrincipal,
    Path(course_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), (StatusCode, Json<ErrorResponse>)> {
    trace!(
        "Entering checkout_course for user_id: {}, course_id: {}",
        principal.id,
        course_id
    );

    match begin_course_checkout(&state.db, principal.id, course_id).await {
        Ok(intent) => {
            info!(
                "Checkout {} started for user {} over course {}, total {}",
                intent.transaction_id, principal.id, course_id, intent.total
            );
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse {
                    data: checkout_response(intent, &state),
                    message: "Checkout started".to_string(),
                    success: true,
                }),
            ))
        }
        Err(err) => {
            warn!(
                "Checkout for user {} over course {} rejected: {}",
                principal.id, course_id, err
            );
            Err(checkout_error(err))
        }
    }
}

/// Start a checkout over the whole cart
#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout-cart",
    tag = "payments",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Checkout started", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Cart holds nothing payable", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn checkout_cart(
    StudentPrincipal(principal): StudentPrincipal,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering checkout_cart for user_id: {}", principal.id);

    match begin_cart_checkout(&state.db, principal.id).await {
        Ok(intent) => {
            info!(
                "Cart checkout {} started for user {} over {} courses, total {}",
                intent.transaction_id,
                principal.id,
                intent.lines.len(),
                intent.total
            );
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse {
                    data: checkout_response(intent, &state),
                    message: "Checkout started".to_string(),
                    success: true,
                }),
            ))
        }
        Err(err) => {
            warn!("Cart checkout for user {} rejected: {}", principal.id, err);
            Err(checkout_error(err))
        }
    }
}

/// Success redirect from the gateway
///
/// Unauthenticated: the gateway redirects the buyer's browser here. Identity
/// comes from the stored payment rows and trust from verification.
#[utoipa::path(
    get,
    path = "/api/v1/payments/success",
    tag = "payments",
    params(
        ("oid" = Option<String>, Query, description = "Transaction id"),
        ("amt" = Option<String>, Query, description = "Paid amount"),
        ("refId" = Option<String>, Query, description = "Gateway reference id"),
    ),
    responses(
        (status = 200, description = "Settled, or already settled earlier", body = ApiResponse<SettlementResponse>),
        (status = 400, description = "Missing or malformed parameters; nothing changed", body = ErrorResponse),
        (status = 402, description = "Verification failed; rows stay pending", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn payment_success(
    Query(query): Query<SuccessCallback>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SettlementResponse>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering payment_success callback");

    let (Some(oid), Some(amt), Some(ref_id)) = (query.oid, query.amt, query.ref_id) else {
        warn!("Success callback with missing parameters rejected");
        return Err(error_body(
            StatusCode::BAD_REQUEST,
            "Callback requires oid, amt and refId".to_string(),
            "INVALID_CALLBACK",
        ));
    };

    let amount = Decimal::from_str(amt.trim()).map_err(|_| {
        warn!("Success callback with unparseable amount '{}' rejected", amt);
        error_body(
            StatusCode::BAD_REQUEST,
            format!("Amount '{amt}' is not a number"),
            "INVALID_CALLBACK",
        )
    })?;

    match confirm_success(&state.db, state.verifier.as_ref(), &oid, amount, &ref_id).await {
        Ok(outcome) => {
            info!(
                "Transaction {} settled: {} enrollments, total {}",
                outcome.transaction_id,
                outcome.enrolled_courses.len(),
                outcome.total
            );
            Ok(Json(ApiResponse {
                data: SettlementResponse {
                    transaction_id: outcome.transaction_id,
                    enrolled_courses: outcome.enrolled_courses,
                    total: outcome.total,
                },
                message: "Payment settled successfully".to_string(),
                success: true,
            }))
        }
        Err(CheckoutError::AlreadyProcessed(transaction_id)) => {
            // Replayed callback; report success without changing anything.
            debug!("Transaction {} was already settled", transaction_id);
            Ok(Json(ApiResponse {
                data: SettlementResponse {
                    transaction_id,
                    enrolled_courses: vec![],
                    total: Decimal::ZERO,
                },
                message: "Transaction already processed".to_string(),
                success: true,
            }))
        }
        Err(err) => {
            error!("Success callback for {} not settled: {}", oid, err);
            Err(checkout_error(err))
        }
    }
}

/// Failure redirect from the gateway
#[utoipa::path(
    get,
    path = "/api/v1/payments/failure",
    tag = "payments",
    params(
        ("pid" = Option<String>, Query, description = "Transaction id"),
    ),
    responses(
        (status = 200, description = "Pending rows marked failed", body = ApiResponse<String>),
        (status = 400, description = "Missing transaction id; nothing changed", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn payment_failure(
    Query(query): Query<FailureCallback>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<String>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering payment_failure callback");

    let Some(pid) = query.pid else {
        warn!("Failure callback without pid rejected");
        return Err(error_body(
            StatusCode::BAD_REQUEST,
            "Callback requires pid".to_string(),
            "INVALID_CALLBACK",
        ));
    };

    match mark_failure(&state.db, &pid).await {
        Ok(count) => {
            info!("Transaction {} marked failed ({} rows)", pid, count);
            Ok(Json(ApiResponse {
                data: format!("{count} payment rows marked failed"),
                message: "Payment marked as failed".to_string(),
                success: true,
            }))
        }
        Err(err) => {
            error!("Failure callback for {} not applied: {}", pid, err);
            Err(checkout_error(err))
        }
    }
}

/// Server-to-server verification of a transaction
///
/// Same semantics as the success redirect, for gateways that notify the
/// backend directly instead of through the buyer's browser.
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    tag = "payments",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Settled, or already settled earlier", body = ApiResponse<SettlementResponse>),
        (status = 402, description = "Verification failed; rows stay pending", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(request))]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<ApiResponse<SettlementResponse>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering verify_payment for transaction {}", request.pid);

    match confirm_success(
        &state.db,
        state.verifier.as_ref(),
        &request.pid,
        request.amt,
        &request.rid,
    )
    .await
    {
        Ok(outcome) => {
            info!(
                "Transaction {} settled via direct verification",
                outcome.transaction_id
            );
            Ok(Json(ApiResponse {
                data: SettlementResponse {
                    transaction_id: outcome.transaction_id,
                    enrolled_courses: outcome.enrolled_courses,
                    total: outcome.total,
                },
                message: "Payment settled successfully".to_string(),
                success: true,
            }))
        }
        Err(CheckoutError::AlreadyProcessed(transaction_id)) => {
            debug!("Transaction {} was already settled", transaction_id);
            Ok(Json(ApiResponse {
                data: SettlementResponse {
                    transaction_id,
                    enrolled_courses: vec![],
                    total: Decimal::ZERO,
                },
                message: "Transaction already processed".to_string(),
                success: true,
            }))
        }
        Err(err) => {
            error!("Verification of {} not settled: {}", request.pid, err);
            Err(checkout_error(err))
        }
    }
}

/// Payment history: a student sees their own rows, an admin sees everything
#[utoipa::path(
    get,
    path = "/api/v1/payments/history",
    tag = "payments",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Payments retrieved successfully", body = ApiResponse<Vec<PaymentResponse>>),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn payment_history(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<PaymentResponse>>>, StatusCode> {
    trace!("Entering payment_history for user_id: {}", principal.id);

    let mut finder = payment::Entity::find().order_by_desc(payment::Column::CreatedAt);
    if !principal.is_admin {
        finder = finder.filter(payment::Column::UserId.eq(principal.id));
    }

    match finder.all(&state.db).await {
        Ok(rows) => {
            debug!("Retrieved {} payment rows", rows.len());
            let data: Vec<PaymentResponse> = rows.into_iter().map(PaymentResponse::from).collect();
            Ok(Json(ApiResponse {
                data,
                message: "Payments retrieved successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to list payments: {}", db_error);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
