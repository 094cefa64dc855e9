use thiserror::Error;

/// Error types for the checkout module
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Error from the database operations
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// The requested course does not exist
    #[error("Course {0} not found")]
    CourseNotFound(i32),

    /// The buyer already holds an enrollment for this course
    #[error("Already enrolled in course {0}")]
    AlreadyEnrolled(i32),

    /// The checkout batch ended up with no payable courses
    #[error("Nothing to check out")]
    EmptyCheckout,

    /// The transaction has no pending rows: already settled or unknown
    #[error("Transaction {0} already processed or unknown")]
    AlreadyProcessed(String),

    /// The gateway did not confirm the payment; rows stay pending
    #[error("Payment verification failed for transaction {0}")]
    VerificationFailed(String),

    /// Transport or protocol failure talking to the gateway
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Malformed or incomplete callback parameters
    #[error("Invalid callback: {0}")]
    InvalidCallback(String),
}

/// Type alias for Result with CheckoutError
pub type Result<T> = std::result::Result<T, CheckoutError>;
