use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, delete, dsl::sum, insert_into, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::subscriptions::{
            InsertSubscriptionEntity, SubscriptionEntity, UpdateSubscriptionEntity,
        },
        repositories::subscriptions::SubscriptionRepository,
        value_objects::{billing_period::BillingPeriod, store_context::StoreContext},
    },
    infrastructure::postgres::{
        postgres_connection::{PgPoolSquad, checkout},
        schema::subscriptions,
    },
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

// Diesel is synchronous; every statement runs on the blocking threadpool so the
// runtime keeps serving other requests while a query is in flight. The blocking
// task outlives a caller that stops waiting, so `checkout` is what decides
// whether the statement runs at all.
#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn create(
        &self,
        ctx: StoreContext,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> Result<Uuid> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Uuid> {
            let mut conn = checkout(&db_pool, &ctx)?;

            let id = insert_into(subscriptions::table)
                .values(&insert_subscription_entity)
                .returning(subscriptions::id)
                .get_result::<Uuid>(&mut conn)?;

            Ok(id)
        })
        .await?
    }

    async fn update(
        &self,
        ctx: StoreContext,
        update_subscription_entity: UpdateSubscriptionEntity,
    ) -> Result<usize> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<usize> {
            let mut conn = checkout(&db_pool, &ctx)?;

            let affected = update(
                subscriptions::table
                    .filter(subscriptions::id.eq(update_subscription_entity.id))
                    .filter(subscriptions::user_id.eq(update_subscription_entity.user_id)),
            )
            .set((
                subscriptions::service_name.eq(&update_subscription_entity.service_name),
                subscriptions::service_price.eq(update_subscription_entity.service_price),
                subscriptions::ended_at.eq(update_subscription_entity.ended_at),
            ))
            .execute(&mut conn)?;

            Ok(affected)
        })
        .await?
    }

    async fn delete(
        &self,
        ctx: StoreContext,
        subscription_id: Uuid,
        user_id: Uuid,
    ) -> Result<usize> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<usize> {
            let mut conn = checkout(&db_pool, &ctx)?;

            let affected = delete(
                subscriptions::table
                    .filter(subscriptions::id.eq(subscription_id))
                    .filter(subscriptions::user_id.eq(user_id)),
            )
            .execute(&mut conn)?;

            Ok(affected)
        })
        .await?
    }

    async fn list_all(&self, ctx: StoreContext) -> Result<Vec<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<SubscriptionEntity>> {
            let mut conn = checkout(&db_pool, &ctx)?;

            let results = subscriptions::table
                .select(SubscriptionEntity::as_select())
                .order((subscriptions::started_at.asc(), subscriptions::id.asc()))
                .load::<SubscriptionEntity>(&mut conn)?;

            Ok(results)
        })
        .await?
    }

    async fn list_by_user(
        &self,
        ctx: StoreContext,
        user_id: Uuid,
    ) -> Result<Vec<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<SubscriptionEntity>> {
            let mut conn = checkout(&db_pool, &ctx)?;

            let results = subscriptions::table
                .filter(subscriptions::user_id.eq(user_id))
                .select(SubscriptionEntity::as_select())
                .order((subscriptions::started_at.asc(), subscriptions::id.asc()))
                .load::<SubscriptionEntity>(&mut conn)?;

            Ok(results)
        })
        .await?
    }

    async fn find_by_id(
        &self,
        ctx: StoreContext,
        subscription_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = checkout(&db_pool, &ctx)?;

            let result = subscriptions::table
                .filter(subscriptions::id.eq(subscription_id))
                .select(SubscriptionEntity::as_select())
                .first::<SubscriptionEntity>(&mut conn)
                .optional()?;

            Ok(result)
        })
        .await?
    }

    async fn total_cost(
        &self,
        ctx: StoreContext,
        user_id: Uuid,
        service_name: &str,
        period: &BillingPeriod,
    ) -> Result<i64> {
        let db_pool = Arc::clone(&self.db_pool);
        let service_name = service_name.to_owned();
        let period = *period;

        task::spawn_blocking(move || -> Result<i64> {
            let mut conn = checkout(&db_pool, &ctx)?;

            // SUM over no rows is NULL.
            let total = subscriptions::table
                .filter(subscriptions::user_id.eq(user_id))
                .filter(subscriptions::service_name.eq(&service_name))
                .filter(subscriptions::started_at.ge(period.from))
                .filter(subscriptions::started_at.le(period.to))
                .select(sum(subscriptions::service_price))
                .get_result::<Option<i64>>(&mut conn)?;

            Ok(total.unwrap_or(0))
        })
        .await?
    }
}
