use anyhow::{bail, Result};
use model::entities::user;
use sea_orm::{ActiveModelTrait, ColumnTrait, Database, EntityTrait, QueryFilter, Set};
use tracing::{debug, info, trace, warn};

use crate::auth::hash_password;
use crate::config::AppConfig;

/// Create the configured admin account. An existing account with the same
/// username is reported loudly, not silently skipped.
pub async fn seed_admin(config: &AppConfig) -> Result<()> {
    trace!("Entering seed_admin function");
    info!("Seeding admin account '{}'", config.admin_username);
    debug!("Database URL: {}", config.database_url);

    let db = Database::connect(&config.database_url).await?;

    let existing = user::Entity::find()
        .filter(user::Column::Username.eq(config.admin_username.as_str()))
        .one(&db)
        .await?;

    if let Some(existing) = existing {
        if existing.is_admin {
            warn!(
                "Admin account '{}' already exists (id {}), nothing to do",
                existing.username, existing.id
            );
            return Ok(());
        }
        bail!(
            "A non-admin account already holds the username '{}'",
            config.admin_username
        );
    }

    let password_hash =
        hash_password(&config.admin_password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let admin = user::ActiveModel {
        username: Set(config.admin_username.clone()),
        email: Set(config.admin_email.clone()),
        password_hash: Set(password_hash),
        is_admin: Set(true),
        ..Default::default()
    }
    .insert(&db)
    .await?;

    info!("Admin account '{}' created with id {}", admin.username, admin.id);
    Ok(())
}
