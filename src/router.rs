use crate::handlers::{
    admin::{get_student, get_summary, list_students},
    auth::{change_password, login, me, register, update_profile},
    cart::{add_cart_item, get_cart, remove_cart_item},
    content::{delete_content, download_content, list_course_content, upload_content},
    courses::{
        create_course, delete_course, get_course, list_courses, update_course, upload_thumbnail,
    },
    enrollments::{list_enrollments, update_progress},
    health::health_check,
    payments::{
        checkout_cart, checkout_course, payment_failure, payment_history, payment_success,
        verify_payment,
    },
};
use crate::schemas::{ApiDoc, AppState};
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Auth routes
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/me", get(me))
        .route("/api/v1/auth/profile", put(update_profile))
        .route("/api/v1/auth/password", put(change_password))
        // Course catalog and administration
        .route("/api/v1/courses", get(list_courses))
        .route("/api/v1/courses", post(create_course))
        .route("/api/v1/courses/:course_id", get(get_course))
        .route("/api/v1/courses/:course_id", put(update_course))
        .route("/api/v1/courses/:course_id", delete(delete_course))
        .route("/api/v1/courses/:course_id/thumbnail", post(upload_thumbnail))
        // Course material
        .route("/api/v1/courses/:course_id/content", get(list_course_content))
        .route("/api/v1/courses/:course_id/content", post(upload_content))
        .route("/api/v1/content/:content_id", delete(delete_content))
        .route("/api/v1/content/:content_id/download", get(download_content))
        // Enrollments and progress
        .route("/api/v1/enrollments", get(list_enrollments))
        .route(
            "/api/v1/enrollments/:course_id/progress",
            put(update_progress),
        )
        // Shopping cart
        .route("/api/v1/cart", get(get_cart))
        .route("/api/v1/cart/:course_id", post(add_cart_item))
        .route("/api/v1/cart/:course_id", delete(remove_cart_item))
        // Checkout and gateway callbacks
        .route("/api/v1/payments/checkout/:course_id", post(checkout_course))
        .route("/api/v1/payments/checkout-cart", post(checkout_cart))
        .route("/api/v1/payments/success", get(payment_success))
        .route("/api/v1/payments/failure", get(payment_failure))
        .route("/api/v1/payments/verify", post(verify_payment))
        .route("/api/v1/payments/history", get(payment_history))
        // Admin analytics
        .route("/api/v1/admin/summary", get(get_summary))
        .route("/api/v1/admin/students", get(list_students))
        .route("/api/v1/admin/students/:user_id", get(get_student))
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
