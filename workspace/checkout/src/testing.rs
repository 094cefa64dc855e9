//! Shared fixtures for the checkout tests: an in-memory database with the
//! full schema applied, row factories, and a scripted gateway double.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use model::entities::{cart_item, course, enrollment, user};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, Set, Statement};

use crate::error::Result;
use crate::gateway::GatewayVerifier;

pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite should connect");
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = ON;".to_owned(),
    ))
    .await
    .expect("enabling foreign keys should work");
    Migrator::up(&db, None).await.expect("migrations should apply");
    db
}

pub async fn make_user(db: &DatabaseConnection, username: &str, is_admin: bool) -> user::Model {
    user::ActiveModel {
        username: Set(username.to_owned()),
        email: Set(format!("{username}@example.com")),
        password_hash: Set("not-a-real-hash".to_owned()),
        is_admin: Set(is_admin),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("user insert should work")
}

pub async fn make_course(db: &DatabaseConnection, title: &str, price: &str) -> course::Model {
    course::ActiveModel {
        title: Set(title.to_owned()),
        price: Set(Decimal::from_str(price).expect("test price should parse")),
        category: Set(course::CourseCategory::General),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("course insert should work")
}

pub async fn enroll(db: &DatabaseConnection, user_id: i32, course_id: i32) -> enrollment::Model {
    enrollment::ActiveModel {
        user_id: Set(user_id),
        course_id: Set(course_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("enrollment insert should work")
}

pub async fn add_to_cart(db: &DatabaseConnection, user_id: i32, course_id: i32) -> cart_item::Model {
    cart_item::ActiveModel {
        user_id: Set(user_id),
        course_id: Set(course_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("cart insert should work")
}

/// Stands in for the gateway: confirms exactly the transactions it was told
/// it captured, at exactly the captured amount.
#[derive(Debug, Default)]
pub struct MockGateway {
    captured: Mutex<HashMap<String, Decimal>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture(&self, transaction_id: &str, amount: Decimal) {
        self.captured
            .lock()
            .expect("mock lock should not be poisoned")
            .insert(transaction_id.to_owned(), amount);
    }
}

#[async_trait]
impl GatewayVerifier for MockGateway {
    async fn verify(
        &self,
        transaction_id: &str,
        amount: Decimal,
        _reference_id: &str,
    ) -> Result<bool> {
        let captured = self
            .captured
            .lock()
            .expect("mock lock should not be poisoned");
        Ok(captured.get(transaction_id) == Some(&amount))
    }
}
