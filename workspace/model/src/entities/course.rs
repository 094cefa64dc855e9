use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

use super::user;

/// Fixed catalog categories for courses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum CourseCategory {
    #[sea_orm(string_value = "general")]
    General,
    #[sea_orm(string_value = "nepali")]
    Nepali,
    #[sea_orm(string_value = "english")]
    English,
    #[sea_orm(string_value = "math")]
    Math,
    #[sea_orm(string_value = "science")]
    Science,
    #[sea_orm(string_value = "constitution")]
    Constitution,
    #[sea_orm(string_value = "computer")]
    Computer,
    #[sea_orm(string_value = "current_affairs")]
    CurrentAffairs,
    #[sea_orm(string_value = "aptitude")]
    Aptitude,
    #[sea_orm(string_value = "other")]
    Other,
}

/// A catalog item. Deleting a course cascades to its content, enrollments,
/// cart rows and payment records.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "courses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    /// Price in the merchant currency. Never negative.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price: Decimal,
    pub category: CourseCategory,
    /// Relative path to the stored thumbnail image, if one was uploaded.
    pub thumbnail: Option<String>,
    /// The admin who created the course. Kept for attribution only.
    pub instructor_id: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "user::Entity",
        from = "Column::InstructorId",
        to = "user::Column::Id",
        on_delete = "SetNull"
    )]
    Instructor,
    #[sea_orm(has_many = "super::content::Entity")]
    Content,
    #[sea_orm(has_many = "super::enrollment::Entity")]
    Enrollment,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payment,
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItem,
}

impl ActiveModelBehavior for ActiveModel {}
