//! User profiles and the credit ledger.
//!
//! Every balance change is a single atomic UPDATE so concurrent requests
//! can't interleave a stale read-modify-write; deductions are additionally
//! guarded by `credits >= amount`, which keeps the balance non-negative.

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{ActiveValue::Set, ConnectionTrait, DatabaseBackend, StatementBuilder};

use crate::constants::SIGNUP_CREDITS;
use crate::error::ColorpageError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "profiles")]
/// A user profile holding the credit balance
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    /// opaque user id
    pub id: String,
    /// account email
    pub email: String,
    /// display name
    pub full_name: String,
    /// remaining generation credits
    pub credits: i32,
    /// subscription tier, `free` at signup
    pub subscription_tier: String,
    /// creation timestamp
    pub created_at: DateTime,
}

/// relations for profiles
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Fetches a profile by user id.
pub async fn find_by_id(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Option<Model>, DbErr> {
    Entity::find_by_id(user_id.to_string()).one(db).await
}

/// Creates a profile seeded with the signup credit balance.
pub async fn create(
    db: &DatabaseConnection,
    user_id: &str,
    email: &str,
    full_name: &str,
) -> Result<Model, ColorpageError> {
    let existing = Entity::find()
        .filter(
            Column::Id
                .eq(user_id)
                .or(Column::Email.eq(email)),
        )
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(ColorpageError::BadRequest(
            "A profile already exists for that user or email".to_string(),
        ));
    }

    let active = ActiveModel {
        id: Set(user_id.to_string()),
        email: Set(email.to_string()),
        full_name: Set(full_name.to_string()),
        credits: Set(SIGNUP_CREDITS),
        subscription_tier: Set("free".to_string()),
        ..Default::default()
    };
    Ok(active.insert(db).await?)
}

/// Adds purchased credits to a profile's balance.
pub async fn add_credits(
    db: &DatabaseConnection,
    user_id: &str,
    amount: i32,
) -> Result<(), ColorpageError> {
    let update = Query::update()
        .table(Entity)
        .value(Column::Credits, Expr::col(Column::Credits).add(amount))
        .and_where(Expr::col(Column::Id).eq(user_id))
        .to_owned();
    let stmt = StatementBuilder::build(&update, &DatabaseBackend::Sqlite);
    let result = db.execute(stmt).await?;
    if result.rows_affected() == 0 {
        return Err(ColorpageError::NotFound(format!("User {}", user_id)));
    }
    Ok(())
}

/// Deducts credits, failing without touching the balance when it can't cover
/// the amount. Returns the balance after the deduction.
pub async fn deduct_credits(
    db: &DatabaseConnection,
    user_id: &str,
    amount: i32,
) -> Result<i32, ColorpageError> {
    let update = Query::update()
        .table(Entity)
        .value(Column::Credits, Expr::col(Column::Credits).sub(amount))
        .and_where(Expr::col(Column::Id).eq(user_id))
        .and_where(Expr::col(Column::Credits).gte(amount))
        .to_owned();
    let stmt = StatementBuilder::build(&update, &DatabaseBackend::Sqlite);
    let result = db.execute(stmt).await?;

    if result.rows_affected() == 0 {
        return match find_by_id(db, user_id).await? {
            Some(profile) => Err(ColorpageError::InsufficientCredits {
                required: amount,
                available: profile.credits,
            }),
            None => Err(ColorpageError::NotFound(format!("User {}", user_id))),
        };
    }

    match find_by_id(db, user_id).await? {
        Some(profile) => Ok(profile.credits),
        None => Err(ColorpageError::NotFound(format!("User {}", user_id))),
    }
}
