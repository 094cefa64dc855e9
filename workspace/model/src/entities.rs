//! This file serves as the root for all SeaORM entity modules.
//! The data models for the course marketplace live here: identity, the
//! catalog, uploaded material, and the purchase records the reconciliation
//! flow operates on.

pub mod cart_item;
pub mod content;
pub mod course;
pub mod enrollment;
pub mod payment;
pub mod user;

pub mod prelude {
    //! A prelude module for easy importing of all entities.
    pub use super::cart_item::Entity as CartItem;
    pub use super::content::Entity as Content;
    pub use super::course::Entity as Course;
    pub use super::enrollment::Entity as Enrollment;
    pub use super::payment::Entity as Payment;
    pub use super::user::Entity as User;
}
