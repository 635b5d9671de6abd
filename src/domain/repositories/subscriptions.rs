use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::subscriptions::{
    InsertSubscriptionEntity, SubscriptionEntity, UpdateSubscriptionEntity,
};
use crate::domain::value_objects::{billing_period::BillingPeriod, store_context::StoreContext};

/// Storage contract for subscriptions. Each method maps to a single statement.
///
/// Implementations must call [`StoreContext::begin`] after acquiring a
/// connection and before executing the statement, and skip the statement when
/// it fails.
#[automock]
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts a row and returns the id generated by the store.
    async fn create(
        &self,
        ctx: StoreContext,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> Result<Uuid>;

    /// Overwrites the mutable fields of the row matching `(id, user_id)`.
    /// Returns the number of rows affected.
    async fn update(
        &self,
        ctx: StoreContext,
        update_subscription_entity: UpdateSubscriptionEntity,
    ) -> Result<usize>;

    /// Deletes the row matching both keys. Returns the number of rows affected.
    async fn delete(&self, ctx: StoreContext, subscription_id: Uuid, user_id: Uuid)
    -> Result<usize>;

    async fn list_all(&self, ctx: StoreContext) -> Result<Vec<SubscriptionEntity>>;

    async fn list_by_user(&self, ctx: StoreContext, user_id: Uuid)
    -> Result<Vec<SubscriptionEntity>>;

    async fn find_by_id(
        &self,
        ctx: StoreContext,
        subscription_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>>;

    /// Sum of `service_price` for the user's rows of `service_name` whose
    /// `started_at` lies inside the closed period. Zero when nothing matches.
    async fn total_cost(
        &self,
        ctx: StoreContext,
        user_id: Uuid,
        service_name: &str,
        period: &BillingPeriod,
    ) -> Result<i64>;
}
