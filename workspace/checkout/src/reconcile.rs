//! Callback reconciler: converts gateway callbacks into durable, idempotent
//! changes to payment and enrollment state.
//!
//! Per transaction-group the states are `pending -> {success, failed}`, both
//! terminal. All updates for one transaction id commit together inside one
//! database transaction, so a concurrent replay can never observe the same
//! pending rows twice.

use model::entities::{cart_item, enrollment, payment};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IsolationLevel, QueryFilter,
    Set, TransactionTrait,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{CheckoutError, Result};
use crate::gateway::GatewayVerifier;

/// What a successful settlement changed.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementOutcome {
    pub transaction_id: String,
    /// Courses the buyer was enrolled in by this settlement.
    pub enrolled_courses: Vec<i32>,
    /// Sum of the settled payment rows.
    pub total: Decimal,
}

/// Settle a success callback.
///
/// Verification comes first; a transaction whose reference the gateway does
/// not confirm is rejected and its rows stay pending for manual retry. A
/// transaction with no pending rows is reported as `AlreadyProcessed` and
/// changes nothing, which makes callback replays safe no-ops.
#[instrument(skip(db, verifier))]
pub async fn confirm_success(
    db: &DatabaseConnection,
    verifier: &dyn GatewayVerifier,
    transaction_id: &str,
    amount: Decimal,
    reference_id: &str,
) -> Result<SettlementOutcome> {
    // Verify, then trust. A transport failure counts as a rejection.
    let genuine = match verifier.verify(transaction_id, amount, reference_id).await {
        Ok(genuine) => genuine,
        Err(err) => {
            warn!(%err, "gateway verification errored, treating as rejection");
            false
        }
    };
    if !genuine {
        return Err(CheckoutError::VerificationFailed(transaction_id.to_string()));
    }

    // Serializable, so two concurrent callbacks for the same transaction id
    // cannot both observe the rows as pending.
    let txn = db
        .begin_with_config(Some(IsolationLevel::Serializable), None)
        .await?;

    let pending = payment::Entity::find()
        .filter(payment::Column::TransactionId.eq(transaction_id))
        .filter(payment::Column::Status.eq(payment::PaymentStatus::Pending))
        .all(&txn)
        .await?;

    if pending.is_empty() {
        // Already settled by an earlier callback, or never ours.
        debug!("no pending rows for transaction, nothing to do");
        return Err(CheckoutError::AlreadyProcessed(transaction_id.to_string()));
    }

    let mut enrolled_courses = Vec::with_capacity(pending.len());
    let mut total = Decimal::ZERO;

    for row in pending {
        let user_id = row.user_id;
        let course_id = row.course_id;
        total += row.amount;

        // Mark the row settled and append the gateway reference for audit.
        let mut settled: payment::ActiveModel = row.into();
        settled.status = Set(payment::PaymentStatus::Success);
        settled.transaction_id = Set(format!("{transaction_id}_{reference_id}"));
        settled.update(&txn).await?;

        // Enrollment creation is idempotent: an existing pair is fine, not
        // an error.
        let existing = enrollment::Entity::find()
            .filter(enrollment::Column::UserId.eq(user_id))
            .filter(enrollment::Column::CourseId.eq(course_id))
            .one(&txn)
            .await?;
        if existing.is_none() {
            enrollment::ActiveModel {
                user_id: Set(user_id),
                course_id: Set(course_id),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        enrolled_courses.push(course_id);

        // Purchase intent is fulfilled; drop the cart row if one exists.
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::CourseId.eq(course_id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    info!(
        transaction_id,
        courses = enrolled_courses.len(),
        total = %total,
        "settled transaction"
    );

    Ok(SettlementOutcome {
        transaction_id: transaction_id.to_string(),
        enrolled_courses,
        total,
    })
}

/// Settle a failure callback: every pending row for the transaction id is
/// marked failed. No enrollment side effects; an unknown id is a no-op.
/// Returns the number of rows transitioned.
#[instrument(skip(db))]
pub async fn mark_failure(db: &DatabaseConnection, transaction_id: &str) -> Result<u64> {
    // Same isolation as settlement; a failure callback can race a success
    // callback for the same transaction id.
    let txn = db
        .begin_with_config(Some(IsolationLevel::Serializable), None)
        .await?;

    let pending = payment::Entity::find()
        .filter(payment::Column::TransactionId.eq(transaction_id))
        .filter(payment::Column::Status.eq(payment::PaymentStatus::Pending))
        .all(&txn)
        .await?;

    let count = pending.len() as u64;
    for row in pending {
        let mut failed: payment::ActiveModel = row.into();
        failed.status = Set(payment::PaymentStatus::Failed);
        failed.update(&txn).await?;
    }

    txn.commit().await?;

    info!(transaction_id, rows = count, "marked transaction failed");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{begin_cart_checkout, begin_course_checkout};
    use crate::testing::{
        add_to_cart, enroll, make_course, make_user, setup_db, MockGateway,
    };
    use model::entities::payment::PaymentStatus;

    #[tokio::test]
    async fn success_callback_settles_every_pending_row() {
        let db = setup_db().await;
        let gateway = MockGateway::new();
        let user = make_user(&db, "alice", false).await;
        let a = make_course(&db, "Course A", "500").await;
        let b = make_course(&db, "Course B", "800").await;
        add_to_cart(&db, user.id, a.id).await;
        add_to_cart(&db, user.id, b.id).await;

        let intent = begin_cart_checkout(&db, user.id).await.unwrap();
        gateway.capture(&intent.transaction_id, intent.total);

        let outcome = confirm_success(&db, &gateway, &intent.transaction_id, intent.total, "REF-1")
            .await
            .expect("settlement should succeed");

        assert_eq!(outcome.total, Decimal::new(1300, 0));
        assert_eq!(outcome.enrolled_courses.len(), 2);

        // Exactly N enrollments for N settled rows, zero pending remain.
        let enrollments = enrollment::Entity::find().all(&db).await.unwrap();
        assert_eq!(enrollments.len(), 2);

        let payments = payment::Entity::find().all(&db).await.unwrap();
        assert!(payments.iter().all(|p| p.status == PaymentStatus::Success));
        // Audit trail: the gateway reference is appended to the stored id.
        assert!(payments
            .iter()
            .all(|p| p.transaction_id == format!("{}_REF-1", intent.transaction_id)));

        // The cart is emptied.
        let cart = cart_item::Entity::find().all(&db).await.unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn replaying_a_success_callback_is_a_safe_noop() {
        let db = setup_db().await;
        let gateway = MockGateway::new();
        let user = make_user(&db, "alice", false).await;
        let course = make_course(&db, "Course A", "500").await;

        let intent = begin_course_checkout(&db, user.id, course.id).await.unwrap();
        gateway.capture(&intent.transaction_id, intent.total);

        confirm_success(&db, &gateway, &intent.transaction_id, intent.total, "REF-1")
            .await
            .unwrap();

        // Second identical delivery: zero pending rows remain, so the replay
        // is reported as already processed and changes nothing.
        let err = confirm_success(&db, &gateway, &intent.transaction_id, intent.total, "REF-1")
            .await
            .expect_err("replay must not settle again");
        assert!(matches!(err, CheckoutError::AlreadyProcessed(_)));

        let enrollments = enrollment::Entity::find().all(&db).await.unwrap();
        assert_eq!(enrollments.len(), 1);
        let success_rows = payment::Entity::find()
            .filter(payment::Column::Status.eq(PaymentStatus::Success))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(success_rows.len(), 1);
    }

    #[tokio::test]
    async fn tampered_amount_is_rejected_and_rows_stay_pending() {
        let db = setup_db().await;
        let gateway = MockGateway::new();
        let user = make_user(&db, "alice", false).await;
        let course = make_course(&db, "Course A", "500").await;

        let intent = begin_course_checkout(&db, user.id, course.id).await.unwrap();
        gateway.capture(&intent.transaction_id, intent.total);

        // Claim a different amount than the gateway captured.
        let forged = Decimal::new(1, 0);
        let err = confirm_success(&db, &gateway, &intent.transaction_id, forged, "REF-1")
            .await
            .expect_err("tampered amount must be rejected");
        assert!(matches!(err, CheckoutError::VerificationFailed(_)));

        // Nothing changed: rows stay pending for manual reconciliation.
        let rows = payment::Entity::find().all(&db).await.unwrap();
        assert!(rows.iter().all(|p| p.status == PaymentStatus::Pending));
        assert!(enrollment::Entity::find().all(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_reference_is_rejected() {
        let db = setup_db().await;
        let gateway = MockGateway::new();
        let user = make_user(&db, "alice", false).await;
        let course = make_course(&db, "Course A", "500").await;

        let intent = begin_course_checkout(&db, user.id, course.id).await.unwrap();
        // The gateway never captured this transaction at all.

        let err = confirm_success(&db, &gateway, &intent.transaction_id, intent.total, "REF-X")
            .await
            .expect_err("unknown transaction must be rejected");
        assert!(matches!(err, CheckoutError::VerificationFailed(_)));
    }

    #[tokio::test]
    async fn failure_callback_fails_all_rows_and_enrolls_nobody() {
        let db = setup_db().await;
        let user = make_user(&db, "alice", false).await;
        let a = make_course(&db, "Course A", "500").await;
        let b = make_course(&db, "Course B", "800").await;
        add_to_cart(&db, user.id, a.id).await;
        add_to_cart(&db, user.id, b.id).await;

        let intent = begin_cart_checkout(&db, user.id).await.unwrap();

        let count = mark_failure(&db, &intent.transaction_id).await.unwrap();
        assert_eq!(count, 2);

        let rows = payment::Entity::find().all(&db).await.unwrap();
        assert!(rows.iter().all(|p| p.status == PaymentStatus::Failed));
        assert!(enrollment::Entity::find().all(&db).await.unwrap().is_empty());

        // Failure is terminal: a later success callback finds no pending rows.
        let gateway = MockGateway::new();
        gateway.capture(&intent.transaction_id, intent.total);
        let err = confirm_success(&db, &gateway, &intent.transaction_id, intent.total, "REF-1")
            .await
            .expect_err("failed transaction must not settle");
        assert!(matches!(err, CheckoutError::AlreadyProcessed(_)));
    }

    #[tokio::test]
    async fn failure_callback_for_unknown_transaction_is_a_noop() {
        let db = setup_db().await;
        let count = mark_failure(&db, "no-such-transaction").await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn settlement_tolerates_an_existing_enrollment() {
        let db = setup_db().await;
        let gateway = MockGateway::new();
        let user = make_user(&db, "alice", false).await;
        let course = make_course(&db, "Course A", "500").await;

        let intent = begin_course_checkout(&db, user.id, course.id).await.unwrap();
        gateway.capture(&intent.transaction_id, intent.total);

        // Enrollment appeared between checkout and callback (e.g. support
        // granted access manually). Settlement must not error.
        enroll(&db, user.id, course.id).await;

        let outcome = confirm_success(&db, &gateway, &intent.transaction_id, intent.total, "REF-1")
            .await
            .expect("existing enrollment is not an error");
        assert_eq!(outcome.enrolled_courses, vec![course.id]);

        let enrollments = enrollment::Entity::find().all(&db).await.unwrap();
        assert_eq!(enrollments.len(), 1);
    }
}
