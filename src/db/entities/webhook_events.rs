//! Processed payment-webhook events.
//!
//! Vendors retry webhook deliveries; recording each event id and crediting
//! only on first sight makes a completed checkout apply exactly once.

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::ActiveValue::Set;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_events")]
/// A webhook event that has already been applied
pub struct Model {
    #[sea_orm(primary_key)]
    /// db id
    pub id: i32,
    /// vendor event id
    pub event_id: String,
    /// first time the event was seen
    pub created_at: DateTime,
}

/// relations for webhook events
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Records an event id, returning `true` the first time it is seen and
/// `false` for replays.
pub async fn record_if_new(
    db: &DatabaseConnection,
    event_id: &str,
) -> Result<bool, DbErr> {
    let active = ActiveModel {
        event_id: Set(event_id.to_string()),
        ..Default::default()
    };
    let inserted = Entity::insert(active)
        .on_conflict(
            OnConflict::column(Column::EventId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(inserted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm_migration::MigratorTrait;

    #[tokio::test]
    async fn replayed_event_ids_are_detected() {
        let db = crate::db::connect_test_db().await.expect("connect test db");
        crate::db::migrations::Migrator::up(&db, None)
            .await
            .expect("run migrations");

        assert!(record_if_new(&db, "evt_1").await.expect("first insert"));
        assert!(!record_if_new(&db, "evt_1").await.expect("replay insert"));
        assert!(record_if_new(&db, "evt_2").await.expect("other event"));
    }
}
