use axum::{extract::State, http::StatusCode, response::Json};
use axum_valid::Valid;
use chrono::NaiveDateTime;
use model::entities::user;
use sea_orm::{ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::{hash_password, issue_token, verify_password, Principal};
use crate::schemas::{ApiResponse, AppState, ErrorResponse};

/// Request body for registering a new account
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct RegisterRequest {
    /// Username (must be unique)
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    /// Email address (must be unique)
    #[validate(email)]
    pub email: String,
    /// Password in plain text; stored only as an argon2 hash
    #[validate(length(min = 6))]
    pub password: String,
}

/// Request body for logging in
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for updating the caller's profile
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

/// Request body for changing the caller's password
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 6))]
    pub new_password: String,
}

/// User response model
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: NaiveDateTime,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            is_admin: model.is_admin,
            created_at: model.created_at,
        }
    }
}

/// Token plus profile returned by register and login
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

fn is_unique_violation(db_error: &DbErr) -> bool {
    let message = match db_error {
        DbErr::Exec(e) => e.to_string(),
        DbErr::Query(e) => e.to_string(),
        other => other.to_string(),
    }
    .to_lowercase();
    message.contains("unique") || message.contains("constraint")
}

fn conflict(error: String, code: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
            success: false,
        }),
    )
}

/// Register a new student account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created successfully", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Username or email already taken", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(request))]
pub async fn register(
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<RegisterRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering register function");
    debug!("Registering account with username: {}", request.username);

    let password_hash = hash_password(&request.password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Internal server error while creating account".to_string(),
                code: "HASHING_ERROR".to_string(),
                success: false,
            }),
        )
    })?;

    let new_user = user::ActiveModel {
        username: Set(request.username.clone()),
        email: Set(request.email.clone()),
        password_hash: Set(password_hash),
        is_admin: Set(false),
        ..Default::default()
    };

    trace!("Attempting to insert new account into database");
    match new_user.insert(&state.db).await {
        Ok(user_model) => {
            info!(
                "Account created successfully with ID: {}, username: {}",
                user_model.id, user_model.username
            );
            let token = issue_token(
                &user_model,
                &state.config.jwt_secret,
                state.config.token_ttl_secs,
            )
            .map_err(|e| {
                error!("Failed to issue token for new account: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Account created but token issuance failed".to_string(),
                        code: "TOKEN_ERROR".to_string(),
                        success: false,
                    }),
                )
            })?;

            let response = ApiResponse {
                data: AuthResponse {
                    token,
                    user: UserResponse::from(user_model),
                },
                message: "Account created successfully".to_string(),
                success: true,
            };
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(db_error) => {
            error!("Failed to create account '{}': {}", request.username, db_error);

            if is_unique_violation(&db_error) {
                Err(conflict(
                    "Username or email is already taken".to_string(),
                    "ACCOUNT_ALREADY_EXISTS",
                ))
            } else {
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Internal server error while creating account".to_string(),
                        code: "DATABASE_ERROR".to_string(),
                        success: false,
                    }),
                ))
            }
        }
    }
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in successfully", body = ApiResponse<AuthResponse>),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(request))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering login function");
    debug!("Login attempt for email: {}", request.email);

    let invalid_credentials = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid email or password".to_string(),
                code: "INVALID_CREDENTIALS".to_string(),
                success: false,
            }),
        )
    };

    let user_model = match user::Entity::find()
        .filter(user::Column::Email.eq(request.email.as_str()))
        .one(&state.db)
        .await
    {
        Ok(Some(user_model)) => user_model,
        Ok(None) => {
            warn!("Login attempt for unknown email: {}", request.email);
            return Err(invalid_credentials());
        }
        Err(db_error) => {
            error!("Failed to look up account for login: {}", db_error);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error during login".to_string(),
                    code: "DATABASE_ERROR".to_string(),
                    success: false,
                }),
            ));
        }
    };

    if !verify_password(&user_model.password_hash, &request.password) {
        warn!("Wrong password for email: {}", request.email);
        return Err(invalid_credentials());
    }

    let token = issue_token(
        &user_model,
        &state.config.jwt_secret,
        state.config.token_ttl_secs,
    )
    .map_err(|e| {
        error!("Failed to issue token: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Token issuance failed".to_string(),
                code: "TOKEN_ERROR".to_string(),
                success: false,
            }),
        )
    })?;

    info!("Account {} logged in", user_model.id);
    let response = ApiResponse {
        data: AuthResponse {
            token,
            user: UserResponse::from(user_model),
        },
        message: "Logged in successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Get the caller's profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Profile retrieved successfully", body = ApiResponse<UserResponse>),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument]
pub async fn me(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<UserResponse>>, StatusCode> {
    trace!("Entering me function for user_id: {}", principal.id);

    match user::Entity::find_by_id(principal.id).one(&state.db).await {
        Ok(Some(user_model)) => {
            debug!("Retrieved profile for user {}", user_model.id);
            let response = ApiResponse {
                data: UserResponse::from(user_model),
                message: "Profile retrieved successfully".to_string(),
                success: true,
            };
            Ok(Json(response))
        }
        Ok(None) => {
            // Token outlived the account.
            warn!("Token refers to missing user {}", principal.id);
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(db_error) => {
            error!("Failed to load profile for user {}: {}", principal.id, db_error);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Update the caller's username or email
#[utoipa::path(
    put,
    path = "/api/v1/auth/profile",
    tag = "auth",
    security(("bearer" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated successfully", body = ApiResponse<UserResponse>),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 409, description = "Username or email already taken", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(request))]
pub async fn update_profile(
    principal: Principal,
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<UpdateProfileRequest>>,
) -> Result<Json<ApiResponse<UserResponse>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering update_profile for user_id: {}", principal.id);

    let existing = match user::Entity::find_by_id(principal.id).one(&state.db).await {
        Ok(Some(user_model)) => user_model,
        Ok(None) => {
            warn!("Token refers to missing user {}", principal.id);
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Account no longer exists".to_string(),
                    code: "UNAUTHORIZED".to_string(),
                    success: false,
                }),
            ));
        }
        Err(db_error) => {
            error!("Failed to load user {} for update: {}", principal.id, db_error);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error while updating profile".to_string(),
                    code: "DATABASE_ERROR".to_string(),
                    success: false,
                }),
            ));
        }
    };

    let mut user_active: user::ActiveModel = existing.into();
    if let Some(username) = request.username {
        debug!("Updating username to: {}", username);
        user_active.username = Set(username);
    }
    if let Some(email) = request.email {
        debug!("Updating email to: {}", email);
        user_active.email = Set(email);
    }

    match user_active.update(&state.db).await {
        Ok(updated) => {
            info!("Profile for user {} updated successfully", updated.id);
            let response = ApiResponse {
                data: UserResponse::from(updated),
                message: "Profile updated successfully".to_string(),
                success: true,
            };
            Ok(Json(response))
        }
        Err(db_error) => {
            error!("Failed to update profile for user {}: {}", principal.id, db_error);
            if is_unique_violation(&db_error) {
                Err(conflict(
                    "Username or email is already taken".to_string(),
                    "ACCOUNT_ALREADY_EXISTS",
                ))
            } else {
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Internal server error while updating profile".to_string(),
                        code: "DATABASE_ERROR".to_string(),
                        success: false,
                    }),
                ))
            }
        }
    }
}

/// Change the caller's password
#[utoipa::path(
    put,
    path = "/api/v1/auth/password",
    tag = "auth",
    security(("bearer" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed successfully", body = ApiResponse<String>),
        (status = 400, description = "Current password is wrong", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(request))]
pub async fn change_password(
    principal: Principal,
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<ChangePasswordRequest>>,
) -> Result<Json<ApiResponse<String>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering change_password for user_id: {}", principal.id);

    let internal = |what: &str| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Internal server error while {what}"),
                code: "DATABASE_ERROR".to_string(),
                success: false,
            }),
        )
    };

    let existing = match user::Entity::find_by_id(principal.id).one(&state.db).await {
        Ok(Some(user_model)) => user_model,
        Ok(None) => {
            warn!("Token refers to missing user {}", principal.id);
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Account no longer exists".to_string(),
                    code: "UNAUTHORIZED".to_string(),
                    success: false,
                }),
            ));
        }
        Err(db_error) => {
            error!("Failed to load user {}: {}", principal.id, db_error);
            return Err(internal("changing password"));
        }
    };

    if !verify_password(&existing.password_hash, &request.current_password) {
        warn!("Wrong current password for user {}", principal.id);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Current password is wrong".to_string(),
                code: "WRONG_PASSWORD".to_string(),
                success: false,
            }),
        ));
    }

    let new_hash = hash_password(&request.new_password).map_err(|e| {
        error!("Failed to hash new password: {}", e);
        internal("changing password")
    })?;

    let mut user_active: user::ActiveModel = existing.into();
    user_active.password_hash = Set(new_hash);

    match user_active.update(&state.db).await {
        Ok(updated) => {
            info!("Password changed for user {}", updated.id);
            let response = ApiResponse {
                data: format!("Password changed for {}", updated.username),
                message: "Password changed successfully".to_string(),
                success: true,
            };
            Ok(Json(response))
        }
        Err(db_error) => {
            error!("Failed to store new password for user {}: {}", principal.id, db_error);
            Err(internal("changing password"))
        }
    }
}
