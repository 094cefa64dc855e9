pub mod admin;
pub mod auth;
pub mod cart;
pub mod content;
pub mod courses;
pub mod enrollments;
pub mod health;
pub mod payments;
