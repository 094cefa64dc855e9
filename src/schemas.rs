use checkout::gateway::GatewayVerifier;
use moka::future::Cache;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

use crate::config::AppConfig;
use crate::handlers;
use crate::handlers::admin::AdminSummary;
use crate::storage::FileStore;

/// Application state shared across handlers
#[derive(Clone, Debug)]
pub struct AppState {
    /// Database connection
    pub db: DatabaseConnection,
    /// Cache for expensive dashboard aggregates
    pub cache: Cache<String, CachedData>,
    /// Upload file provider
    pub store: FileStore,
    /// Gateway verification backend; swapped for a scripted double in tests
    pub verifier: Arc<dyn GatewayVerifier>,
    pub config: AppConfig,
}

/// Cached data types
#[derive(Clone, Debug)]
pub enum CachedData {
    Summary(AdminSummary),
}

/// API response wrapper
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response message
    pub message: String,
    /// Success status
    pub success: bool,
}

/// Error response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
    /// Success status (always false for errors)
    pub success: bool,
}

/// Health check response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Database connection status
    pub database: String,
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::me,
        crate::handlers::auth::update_profile,
        crate::handlers::auth::change_password,
        crate::handlers::courses::list_courses,
        crate::handlers::courses::get_course,
        crate::handlers::courses::create_course,
        crate::handlers::courses::update_course,
        crate::handlers::courses::delete_course,
        crate::handlers::courses::upload_thumbnail,
        crate::handlers::content::list_course_content,
        crate::handlers::content::upload_content,
        crate::handlers::content::delete_content,
        crate::handlers::content::download_content,
        crate::handlers::enrollments::list_enrollments,
        crate::handlers::enrollments::update_progress,
        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_cart_item,
        crate::handlers::cart::remove_cart_item,
        crate::handlers::payments::checkout_course,
        crate::handlers::payments::checkout_cart,
        crate::handlers::payments::payment_success,
        crate::handlers::payments::payment_failure,
        crate::handlers::payments::verify_payment,
        crate::handlers::payments::payment_history,
        crate::handlers::admin::get_summary,
        crate::handlers::admin::list_students,
        crate::handlers::admin::get_student,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            handlers::auth::RegisterRequest,
            handlers::auth::LoginRequest,
            handlers::auth::UpdateProfileRequest,
            handlers::auth::ChangePasswordRequest,
            handlers::auth::UserResponse,
            handlers::auth::AuthResponse,
            handlers::courses::CreateCourseRequest,
            handlers::courses::UpdateCourseRequest,
            handlers::courses::CourseResponse,
            handlers::content::ContentResponse,
            handlers::enrollments::ProgressRequest,
            handlers::enrollments::EnrollmentResponse,
            handlers::cart::CartItemResponse,
            handlers::cart::CartResponse,
            handlers::payments::CheckoutResponse,
            handlers::payments::VerifyRequest,
            handlers::payments::SettlementResponse,
            handlers::payments::PaymentResponse,
            handlers::admin::AdminSummary,
            handlers::admin::RecentEnrollment,
            handlers::admin::PopularCourse,
            handlers::admin::StudentDetailResponse,
            handlers::admin::StudentEnrollment,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration, login and profile endpoints"),
        (name = "courses", description = "Course catalog and administration endpoints"),
        (name = "content", description = "Course material endpoints"),
        (name = "enrollments", description = "Enrollment and progress endpoints"),
        (name = "cart", description = "Shopping cart endpoints"),
        (name = "payments", description = "Checkout and gateway callback endpoints"),
        (name = "admin", description = "Analytics and student administration endpoints"),
    ),
    info(
        title = "CourseHub API",
        description = "Online course marketplace API - catalog, enrollment and payment reconciliation",
        version = "0.1.0",
        contact(
            name = "CourseHub Team",
            email = "contact@coursehub.local"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
pub struct ApiDoc;
