//! Transaction builder: turns a purchase intent (one course, or the whole
//! cart) into a group of pending payment rows sharing one freshly generated
//! transaction id.

use model::entities::{cart_item, course, enrollment, payment};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{CheckoutError, Result};

/// One payable course inside a checkout batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutLine {
    pub course_id: i32,
    pub amount: Decimal,
}

/// The persisted outcome of a checkout: the transaction id shared by all
/// pending payment rows and the total handed to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutIntent {
    pub transaction_id: String,
    pub total: Decimal,
    pub lines: Vec<CheckoutLine>,
}

/// Generate a fresh opaque transaction identifier.
pub fn new_transaction_id() -> String {
    Uuid::new_v4().to_string()
}

/// Whether the user already holds an enrollment for the course.
pub async fn is_enrolled(db: &DatabaseConnection, user_id: i32, course_id: i32) -> Result<bool> {
    let existing = enrollment::Entity::find()
        .filter(enrollment::Column::UserId.eq(user_id))
        .filter(enrollment::Column::CourseId.eq(course_id))
        .one(db)
        .await?;
    Ok(existing.is_some())
}

/// Begin a checkout for a single course.
///
/// Rejects with `AlreadyEnrolled` when the buyer already owns the course.
/// On success one pending payment row exists carrying the course's current
/// price.
#[instrument(skip(db))]
pub async fn begin_course_checkout(
    db: &DatabaseConnection,
    user_id: i32,
    course_id: i32,
) -> Result<CheckoutIntent> {
    let course = course::Entity::find_by_id(course_id)
        .one(db)
        .await?
        .ok_or(CheckoutError::CourseNotFound(course_id))?;

    if is_enrolled(db, user_id, course_id).await? {
        return Err(CheckoutError::AlreadyEnrolled(course_id));
    }

    let transaction_id = new_transaction_id();

    payment::ActiveModel {
        user_id: Set(user_id),
        course_id: Set(course_id),
        amount: Set(course.price),
        transaction_id: Set(transaction_id.clone()),
        status: Set(payment::PaymentStatus::Pending),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(
        transaction_id = %transaction_id,
        course_id,
        amount = %course.price,
        "created single-course checkout"
    );

    Ok(CheckoutIntent {
        transaction_id,
        total: course.price,
        lines: vec![CheckoutLine {
            course_id,
            amount: course.price,
        }],
    })
}

/// Begin a checkout for everything in the user's cart.
///
/// Courses the user is already enrolled in are skipped silently; the batch
/// only fails when nothing payable remains (`EmptyCheckout`). All pending
/// rows are inserted in one database transaction.
#[instrument(skip(db))]
pub async fn begin_cart_checkout(db: &DatabaseConnection, user_id: i32) -> Result<CheckoutIntent> {
    let cart = cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(user_id))
        .find_also_related(course::Entity)
        .all(db)
        .await?;

    if cart.is_empty() {
        return Err(CheckoutError::EmptyCheckout);
    }

    let mut lines = Vec::new();
    for (item, course) in cart {
        // A cart row without a course means the course was deleted
        // underneath it; there is nothing to charge for.
        let Some(course) = course else {
            debug!(course_id = item.course_id, "cart row without course, skipping");
            continue;
        };
        if is_enrolled(db, user_id, course.id).await? {
            debug!(course_id = course.id, "already enrolled, skipping cart item");
            continue;
        }
        lines.push(CheckoutLine {
            course_id: course.id,
            amount: course.price,
        });
    }

    if lines.is_empty() {
        return Err(CheckoutError::EmptyCheckout);
    }

    let transaction_id = new_transaction_id();
    let total: Decimal = lines.iter().map(|l| l.amount).sum();

    // All rows of one checkout land together or not at all.
    let txn = db.begin().await?;
    for line in &lines {
        payment::ActiveModel {
            user_id: Set(user_id),
            course_id: Set(line.course_id),
            amount: Set(line.amount),
            transaction_id: Set(transaction_id.clone()),
            status: Set(payment::PaymentStatus::Pending),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }
    txn.commit().await?;

    info!(
        transaction_id = %transaction_id,
        courses = lines.len(),
        total = %total,
        "created cart checkout"
    );

    Ok(CheckoutIntent {
        transaction_id,
        total,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_to_cart, enroll, make_course, make_user, setup_db};
    use model::entities::payment::PaymentStatus;

    #[tokio::test]
    async fn single_course_checkout_creates_one_pending_row() {
        let db = setup_db().await;
        let user = make_user(&db, "alice", false).await;
        let course = make_course(&db, "GK Primer", "500").await;

        let intent = begin_course_checkout(&db, user.id, course.id)
            .await
            .expect("checkout should succeed");

        assert_eq!(intent.total, Decimal::new(500, 0));
        assert_eq!(intent.lines.len(), 1);

        let rows = payment::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PaymentStatus::Pending);
        assert_eq!(rows[0].transaction_id, intent.transaction_id);
        assert_eq!(rows[0].amount, Decimal::new(500, 0));
    }

    #[tokio::test]
    async fn single_course_checkout_rejects_enrolled_buyer() {
        let db = setup_db().await;
        let user = make_user(&db, "alice", false).await;
        let course = make_course(&db, "GK Primer", "500").await;
        enroll(&db, user.id, course.id).await;

        let err = begin_course_checkout(&db, user.id, course.id)
            .await
            .expect_err("already enrolled must be rejected");
        assert!(matches!(err, CheckoutError::AlreadyEnrolled(id) if id == course.id));

        assert!(payment::Entity::find().all(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_course_is_rejected() {
        let db = setup_db().await;
        let user = make_user(&db, "alice", false).await;

        let err = begin_course_checkout(&db, user.id, 4242)
            .await
            .expect_err("unknown course must be rejected");
        assert!(matches!(err, CheckoutError::CourseNotFound(4242)));
    }

    #[tokio::test]
    async fn cart_checkout_shares_one_transaction_id() {
        let db = setup_db().await;
        let user = make_user(&db, "alice", false).await;
        let a = make_course(&db, "Course A", "500").await;
        let b = make_course(&db, "Course B", "800").await;
        add_to_cart(&db, user.id, a.id).await;
        add_to_cart(&db, user.id, b.id).await;

        let intent = begin_cart_checkout(&db, user.id)
            .await
            .expect("cart checkout should succeed");

        assert_eq!(intent.total, Decimal::new(1300, 0));
        assert_eq!(intent.lines.len(), 2);

        let rows = payment::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.transaction_id == intent.transaction_id));
        assert!(rows.iter().all(|r| r.status == PaymentStatus::Pending));
    }

    #[tokio::test]
    async fn cart_checkout_skips_enrolled_courses() {
        let db = setup_db().await;
        let user = make_user(&db, "alice", false).await;
        let a = make_course(&db, "Course A", "500").await;
        let b = make_course(&db, "Course B", "800").await;
        add_to_cart(&db, user.id, a.id).await;
        add_to_cart(&db, user.id, b.id).await;
        enroll(&db, user.id, a.id).await;

        let intent = begin_cart_checkout(&db, user.id)
            .await
            .expect("cart checkout should succeed");

        assert_eq!(intent.lines.len(), 1);
        assert_eq!(intent.lines[0].course_id, b.id);
        assert_eq!(intent.total, Decimal::new(800, 0));

        let rows = payment::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].course_id, b.id);
    }

    #[tokio::test]
    async fn empty_or_fully_enrolled_cart_is_rejected() {
        let db = setup_db().await;
        let user = make_user(&db, "alice", false).await;

        let err = begin_cart_checkout(&db, user.id)
            .await
            .expect_err("empty cart must be rejected");
        assert!(matches!(err, CheckoutError::EmptyCheckout));

        let a = make_course(&db, "Course A", "500").await;
        add_to_cart(&db, user.id, a.id).await;
        enroll(&db, user.id, a.id).await;

        let err = begin_cart_checkout(&db, user.id)
            .await
            .expect_err("fully enrolled cart must be rejected");
        assert!(matches!(err, CheckoutError::EmptyCheckout));
    }
}
