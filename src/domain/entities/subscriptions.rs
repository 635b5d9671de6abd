use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::subscriptions;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub service_name: String,
    pub service_price: i32, // minor currency units, never negative
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>, // None while the subscription is still active
}

/// Row shape for inserts. The id is generated by the database.
#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct InsertSubscriptionEntity {
    pub service_name: String,
    pub service_price: i32,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Mutable field set of an existing row, addressed by `(id, user_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSubscriptionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_name: String,
    pub service_price: i32,
    pub ended_at: Option<DateTime<Utc>>,
}
