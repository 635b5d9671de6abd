use std::{future::Future, pin::pin, sync::Arc, time::Duration};

use anyhow::anyhow;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{
    entities::subscriptions::{InsertSubscriptionEntity, UpdateSubscriptionEntity},
    repositories::subscriptions::SubscriptionRepository,
    value_objects::{
        billing_period::BillingPeriod,
        store_context::StoreContext,
        subscriptions::{CreateSubscriptionModel, SubscriptionModel, UpdateSubscriptionModel},
    },
};

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("{0}")]
    Validation(String),
    #[error("subscription not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl SubscriptionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            SubscriptionError::Validation(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::NotFound => StatusCode::NOT_FOUND,
            SubscriptionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionError>;

pub struct SubscriptionUseCase<R>
where
    R: SubscriptionRepository + Send + Sync + 'static,
{
    subscription_repo: Arc<R>,
    store_timeout: Duration,
}

impl<R> SubscriptionUseCase<R>
where
    R: SubscriptionRepository + Send + Sync + 'static,
{
    pub fn new(subscription_repo: Arc<R>, store_timeout: Duration) -> Self {
        Self {
            subscription_repo,
            store_timeout,
        }
    }

    pub async fn create(&self, create_model: CreateSubscriptionModel) -> UseCaseResult<Uuid> {
        let user_id = create_model.user_id;
        info!(
            %user_id,
            service_name = %create_model.service_name,
            service_price = create_model.service_price,
            "subscriptions: create requested"
        );

        validate_price(create_model.service_price).inspect_err(|err| {
            warn!(
                %user_id,
                error = %err,
                status = err.status_code().as_u16(),
                "subscriptions: create rejected"
            );
        })?;

        let insert_entity = InsertSubscriptionEntity {
            service_name: create_model.service_name,
            service_price: create_model.service_price,
            user_id,
            started_at: Utc::now(),
            ended_at: create_model.ended_at,
        };

        let subscription_id = self
            .with_deadline("create", |ctx| {
                self.subscription_repo.create(ctx, insert_entity)
            })
            .await
            .inspect_err(|err| {
                error!(%user_id, db_error = ?err, "subscriptions: failed to create subscription");
            })?;

        info!(%user_id, %subscription_id, "subscriptions: subscription created");
        Ok(subscription_id)
    }

    pub async fn update(
        &self,
        subscription_id: Uuid,
        update_model: UpdateSubscriptionModel,
    ) -> UseCaseResult<()> {
        let user_id = update_model.user_id;
        info!(%user_id, %subscription_id, "subscriptions: update requested");

        validate_price(update_model.service_price).inspect_err(|err| {
            warn!(
                %user_id,
                %subscription_id,
                error = %err,
                status = err.status_code().as_u16(),
                "subscriptions: update rejected"
            );
        })?;

        let update_entity = UpdateSubscriptionEntity {
            id: subscription_id,
            user_id,
            service_name: update_model.service_name,
            service_price: update_model.service_price,
            ended_at: update_model.ended_at,
        };

        let affected = self
            .with_deadline("update", |ctx| {
                self.subscription_repo.update(ctx, update_entity)
            })
            .await
            .inspect_err(|err| {
                error!(
                    %user_id,
                    %subscription_id,
                    db_error = ?err,
                    "subscriptions: failed to update subscription"
                );
            })?;

        if affected == 0 {
            warn!(
                %user_id,
                %subscription_id,
                "subscriptions: update matched no subscription for this owner"
            );
        } else {
            info!(%user_id, %subscription_id, "subscriptions: subscription updated");
        }

        Ok(())
    }

    pub async fn delete(&self, subscription_id: Uuid, user_id: Uuid) -> UseCaseResult<()> {
        info!(%user_id, %subscription_id, "subscriptions: delete requested");

        let affected = self
            .with_deadline("delete", |ctx| {
                self.subscription_repo.delete(ctx, subscription_id, user_id)
            })
            .await
            .inspect_err(|err| {
                error!(
                    %user_id,
                    %subscription_id,
                    db_error = ?err,
                    "subscriptions: failed to delete subscription"
                );
            })?;

        if affected == 0 {
            info!(
                %user_id,
                %subscription_id,
                "subscriptions: delete matched no subscription for this owner"
            );
        } else {
            info!(%user_id, %subscription_id, "subscriptions: subscription deleted");
        }

        Ok(())
    }

    pub async fn list_all(&self) -> UseCaseResult<Vec<SubscriptionModel>> {
        debug!("subscriptions: listing all subscriptions");

        let subscriptions = self
            .with_deadline("list_all", |ctx| self.subscription_repo.list_all(ctx))
            .await
            .inspect_err(|err| {
                error!(db_error = ?err, "subscriptions: failed to list subscriptions");
            })?;

        Ok(subscriptions
            .into_iter()
            .map(SubscriptionModel::from)
            .collect())
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> UseCaseResult<Vec<SubscriptionModel>> {
        debug!(%user_id, "subscriptions: listing user subscriptions");

        let subscriptions = self
            .with_deadline("list_by_user", |ctx| {
                self.subscription_repo.list_by_user(ctx, user_id)
            })
            .await
            .inspect_err(|err| {
                error!(
                    %user_id,
                    db_error = ?err,
                    "subscriptions: failed to list user subscriptions"
                );
            })?;

        Ok(subscriptions
            .into_iter()
            .map(SubscriptionModel::from)
            .collect())
    }

    pub async fn get_by_id(&self, subscription_id: Uuid) -> UseCaseResult<SubscriptionModel> {
        debug!(%subscription_id, "subscriptions: loading subscription");

        let subscription = self
            .with_deadline("find_by_id", |ctx| {
                self.subscription_repo.find_by_id(ctx, subscription_id)
            })
            .await
            .inspect_err(|err| {
                error!(
                    %subscription_id,
                    db_error = ?err,
                    "subscriptions: failed to load subscription"
                );
            })?;

        match subscription {
            Some(subscription) => Ok(SubscriptionModel::from(subscription)),
            None => {
                info!(%subscription_id, "subscriptions: subscription not found");
                Err(SubscriptionError::NotFound)
            }
        }
    }

    /// Sums prices for one user and service over whole months, `from` and `to`
    /// given as `MM-YYYY`.
    pub async fn total_cost(
        &self,
        user_id: Uuid,
        service_name: &str,
        from: &str,
        to: &str,
    ) -> UseCaseResult<i64> {
        info!(
            %user_id,
            service_name,
            from,
            to,
            "subscriptions: total cost requested"
        );

        if service_name.trim().is_empty() {
            let err = SubscriptionError::Validation("service_name is required".to_string());
            warn!(
                %user_id,
                status = err.status_code().as_u16(),
                "subscriptions: total cost rejected, missing service name"
            );
            return Err(err);
        }

        let period = BillingPeriod::from_month_range(from, to).map_err(|err| {
            warn!(
                %user_id,
                service_name,
                error = %err,
                status = axum::http::StatusCode::BAD_REQUEST.as_u16(),
                "subscriptions: total cost rejected, invalid period"
            );
            SubscriptionError::Validation(err.to_string())
        })?;

        debug!(
            %user_id,
            service_name,
            period_from = %period.from,
            period_to = %period.to,
            "subscriptions: normalized period"
        );

        let total_cost = self
            .with_deadline("total_cost", |ctx| {
                self.subscription_repo
                    .total_cost(ctx, user_id, service_name, &period)
            })
            .await
            .inspect_err(|err| {
                error!(
                    %user_id,
                    service_name,
                    db_error = ?err,
                    "subscriptions: failed to compute total cost"
                );
            })?;

        info!(%user_id, service_name, total_cost, "subscriptions: total cost calculated");
        Ok(total_cost)
    }

    /// Runs one store call under the configured deadline.
    ///
    /// On timeout the call is abandoned unless its statement already started;
    /// then the statement's own outcome is awaited and reported. Dropping the
    /// returned future abandons a call that has not started yet.
    async fn with_deadline<T, F>(
        &self,
        operation: &'static str,
        make_call: impl FnOnce(StoreContext) -> F,
    ) -> UseCaseResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let ctx = StoreContext::with_timeout(self.store_timeout);
        let _abandon_on_drop = AbandonOnDrop(ctx.clone());
        let mut call = pin!(make_call(ctx.clone()));

        let outcome = match tokio::time::timeout(self.store_timeout, call.as_mut()).await {
            Ok(outcome) => outcome,
            Err(_) if ctx.abandon() => {
                return Err(SubscriptionError::Storage(anyhow!(
                    "subscriptions.{operation}: store call timed out after {:?}",
                    self.store_timeout
                )));
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout = ?self.store_timeout,
                    "subscriptions: deadline passed mid-statement, awaiting its outcome"
                );
                call.await
            }
        };

        outcome.map_err(|err| {
            SubscriptionError::Storage(err.context(format!("subscriptions.{operation}")))
        })
    }
}

struct AbandonOnDrop(StoreContext);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

fn validate_price(service_price: i32) -> UseCaseResult<()> {
    if service_price < 0 {
        return Err(SubscriptionError::Validation(
            "service_price cannot be negative".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        entities::subscriptions::SubscriptionEntity,
        repositories::subscriptions::MockSubscriptionRepository,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Datelike, TimeZone};
    use mockall::predicate::{always, eq};
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    const STORE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Keeps rows in memory and applies the same filters the SQL statements do.
    #[derive(Default)]
    struct InMemorySubscriptionRepository {
        rows: Mutex<Vec<SubscriptionEntity>>,
    }

    impl InMemorySubscriptionRepository {
        fn insert_row(&self, row: SubscriptionEntity) {
            self.rows.lock().unwrap().push(row);
        }
    }

    #[async_trait]
    impl SubscriptionRepository for InMemorySubscriptionRepository {
        async fn create(
            &self,
            _: StoreContext,
            entity: InsertSubscriptionEntity,
        ) -> anyhow::Result<Uuid> {
            let id = Uuid::new_v4();
            self.insert_row(SubscriptionEntity {
                id,
                service_name: entity.service_name,
                service_price: entity.service_price,
                user_id: entity.user_id,
                started_at: entity.started_at,
                ended_at: entity.ended_at,
            });
            Ok(id)
        }

        async fn update(
            &self,
            _: StoreContext,
            entity: UpdateSubscriptionEntity,
        ) -> anyhow::Result<usize> {
            let mut rows = self.rows.lock().unwrap();
            let mut affected = 0;
            for row in rows
                .iter_mut()
                .filter(|row| row.id == entity.id && row.user_id == entity.user_id)
            {
                row.service_name = entity.service_name.clone();
                row.service_price = entity.service_price;
                row.ended_at = entity.ended_at;
                affected += 1;
            }
            Ok(affected)
        }

        async fn delete(
            &self,
            _: StoreContext,
            subscription_id: Uuid,
            user_id: Uuid,
        ) -> anyhow::Result<usize> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|row| !(row.id == subscription_id && row.user_id == user_id));
            Ok(before - rows.len())
        }

        async fn list_all(&self, _: StoreContext) -> anyhow::Result<Vec<SubscriptionEntity>> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn list_by_user(
            &self,
            _: StoreContext,
            user_id: Uuid,
        ) -> anyhow::Result<Vec<SubscriptionEntity>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|row| row.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn find_by_id(
            &self,
            _: StoreContext,
            subscription_id: Uuid,
        ) -> anyhow::Result<Option<SubscriptionEntity>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|row| row.id == subscription_id)
                .cloned())
        }

        async fn total_cost(
            &self,
            _: StoreContext,
            user_id: Uuid,
            service_name: &str,
            period: &BillingPeriod,
        ) -> anyhow::Result<i64> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|row| row.user_id == user_id && row.service_name == service_name)
                .filter(|row| period.contains(row.started_at))
                .map(|row| i64::from(row.service_price))
                .sum())
        }
    }

    /// Never answers, so every call runs into the deadline.
    struct StalledSubscriptionRepository;

    #[async_trait]
    impl SubscriptionRepository for StalledSubscriptionRepository {
        async fn create(
            &self,
            _: StoreContext,
            _: InsertSubscriptionEntity,
        ) -> anyhow::Result<Uuid> {
            std::future::pending().await
        }
        async fn update(
            &self,
            _: StoreContext,
            _: UpdateSubscriptionEntity,
        ) -> anyhow::Result<usize> {
            std::future::pending().await
        }
        async fn delete(&self, _: StoreContext, _: Uuid, _: Uuid) -> anyhow::Result<usize> {
            std::future::pending().await
        }
        async fn list_all(&self, _: StoreContext) -> anyhow::Result<Vec<SubscriptionEntity>> {
            std::future::pending().await
        }
        async fn list_by_user(
            &self,
            _: StoreContext,
            _: Uuid,
        ) -> anyhow::Result<Vec<SubscriptionEntity>> {
            std::future::pending().await
        }
        async fn find_by_id(
            &self,
            _: StoreContext,
            _: Uuid,
        ) -> anyhow::Result<Option<SubscriptionEntity>> {
            std::future::pending().await
        }
        async fn total_cost(
            &self,
            _: StoreContext,
            _: Uuid,
            _: &str,
            _: &BillingPeriod,
        ) -> anyhow::Result<i64> {
            std::future::pending().await
        }
    }

    /// Behaves like the Postgres adapter: the work runs on the blocking pool,
    /// first waiting for a connection, then claiming the call, then running
    /// the statement. Counts the inserts that actually took effect.
    struct BlockingSubscriptionRepository {
        connection_wait: Duration,
        statement_time: Duration,
        committed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SubscriptionRepository for BlockingSubscriptionRepository {
        async fn create(
            &self,
            ctx: StoreContext,
            _: InsertSubscriptionEntity,
        ) -> anyhow::Result<Uuid> {
            let connection_wait = self.connection_wait;
            let statement_time = self.statement_time;
            let committed = Arc::clone(&self.committed);

            tokio::task::spawn_blocking(move || -> anyhow::Result<Uuid> {
                std::thread::sleep(connection_wait);
                ctx.begin()?;

                std::thread::sleep(statement_time);
                committed.fetch_add(1, Ordering::SeqCst);
                Ok(Uuid::new_v4())
            })
            .await?
        }
        async fn update(
            &self,
            _: StoreContext,
            _: UpdateSubscriptionEntity,
        ) -> anyhow::Result<usize> {
            unimplemented!()
        }
        async fn delete(&self, _: StoreContext, _: Uuid, _: Uuid) -> anyhow::Result<usize> {
            unimplemented!()
        }
        async fn list_all(&self, _: StoreContext) -> anyhow::Result<Vec<SubscriptionEntity>> {
            unimplemented!()
        }
        async fn list_by_user(
            &self,
            _: StoreContext,
            _: Uuid,
        ) -> anyhow::Result<Vec<SubscriptionEntity>> {
            unimplemented!()
        }
        async fn find_by_id(
            &self,
            _: StoreContext,
            _: Uuid,
        ) -> anyhow::Result<Option<SubscriptionEntity>> {
            unimplemented!()
        }
        async fn total_cost(
            &self,
            _: StoreContext,
            _: Uuid,
            _: &str,
            _: &BillingPeriod,
        ) -> anyhow::Result<i64> {
            unimplemented!()
        }
    }

    fn in_memory_usecase() -> (
        Arc<InMemorySubscriptionRepository>,
        SubscriptionUseCase<InMemorySubscriptionRepository>,
    ) {
        let repo = Arc::new(InMemorySubscriptionRepository::default());
        let usecase = SubscriptionUseCase::new(Arc::clone(&repo), STORE_TIMEOUT);
        (repo, usecase)
    }

    fn create_model(user_id: Uuid, service_name: &str, service_price: i32) -> CreateSubscriptionModel {
        CreateSubscriptionModel {
            service_name: service_name.to_string(),
            service_price,
            user_id,
            ended_at: None,
        }
    }

    fn row(user_id: Uuid, service_name: &str, price: i32, started_at: DateTime<Utc>) -> SubscriptionEntity {
        SubscriptionEntity {
            id: Uuid::new_v4(),
            service_name: service_name.to_string(),
            service_price: price,
            user_id,
            started_at,
            ended_at: None,
        }
    }

    fn month_year(instant: DateTime<Utc>) -> String {
        format!("{:02}-{:04}", instant.month(), instant.year())
    }

    #[tokio::test]
    async fn negative_price_is_rejected_before_any_store_call() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_create().never();
        subscription_repo.expect_update().never();

        let usecase = SubscriptionUseCase::new(Arc::new(subscription_repo), STORE_TIMEOUT);
        let user_id = Uuid::new_v4();

        for price in [-1, -990, i32::MIN] {
            let err = usecase
                .create(create_model(user_id, "Netflix", price))
                .await
                .unwrap_err();
            assert!(matches!(err, SubscriptionError::Validation(_)));

            let err = usecase
                .update(
                    Uuid::new_v4(),
                    UpdateSubscriptionModel {
                        service_name: "Netflix".to_string(),
                        service_price: price,
                        user_id,
                        ended_at: None,
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, SubscriptionError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn create_stamps_start_time_and_returns_store_id() {
        let user_id = Uuid::new_v4();
        let generated_id = Uuid::new_v4();
        let before = Utc::now();

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_create()
            .withf(move |_, entity| {
                entity.user_id == user_id
                    && entity.service_name == "Netflix"
                    && entity.service_price == 0
                    && entity.started_at >= before
                    && entity.ended_at.is_none()
            })
            .times(1)
            .returning(move |_, _| Ok(generated_id));

        let usecase = SubscriptionUseCase::new(Arc::new(subscription_repo), STORE_TIMEOUT);
        let id = usecase
            .create(create_model(user_id, "Netflix", 0))
            .await
            .unwrap();

        assert_eq!(id, generated_id);
    }

    #[tokio::test]
    async fn created_subscription_reads_back_unchanged() {
        let (_, usecase) = in_memory_usecase();
        let user_id = Uuid::new_v4();
        let ended_at = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();

        let before = Utc::now();
        let id = usecase
            .create(CreateSubscriptionModel {
                service_name: "Yandex Plus".to_string(),
                service_price: 400,
                user_id,
                ended_at: Some(ended_at),
            })
            .await
            .unwrap();

        let loaded = usecase.get_by_id(id).await.unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.service_name, "Yandex Plus");
        assert_eq!(loaded.service_price, 400);
        assert_eq!(loaded.user_id, user_id);
        assert_eq!(loaded.ended_at, Some(ended_at));
        assert!(loaded.started_at >= before && loaded.started_at <= Utc::now());
    }

    #[tokio::test]
    async fn update_passes_path_id_and_mutable_fields() {
        let subscription_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let ended_at = Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap();

        let expected = UpdateSubscriptionEntity {
            id: subscription_id,
            user_id,
            service_name: "Spotify".to_string(),
            service_price: 299,
            ended_at: Some(ended_at),
        };

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_update()
            .with(always(), eq(expected))
            .times(1)
            .returning(|_, _| Ok(1));

        let usecase = SubscriptionUseCase::new(Arc::new(subscription_repo), STORE_TIMEOUT);
        usecase
            .update(
                subscription_id,
                UpdateSubscriptionModel {
                    service_name: "Spotify".to_string(),
                    service_price: 299,
                    user_id,
                    ended_at: Some(ended_at),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_an_error() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_update()
            .times(1)
            .returning(|_, _| Ok(0));

        let usecase = SubscriptionUseCase::new(Arc::new(subscription_repo), STORE_TIMEOUT);
        let result = usecase
            .update(
                Uuid::new_v4(),
                UpdateSubscriptionModel {
                    service_name: "Spotify".to_string(),
                    service_price: 299,
                    user_id: Uuid::new_v4(),
                    ended_at: None,
                },
            )
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn delete_with_foreign_owner_keeps_the_row() {
        let (_, usecase) = in_memory_usecase();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let id = usecase
            .create(create_model(owner, "Netflix", 990))
            .await
            .unwrap();

        usecase.delete(id, stranger).await.unwrap();
        assert_eq!(usecase.get_by_id(id).await.unwrap().user_id, owner);

        usecase.delete(id, owner).await.unwrap();
        assert!(matches!(
            usecase.get_by_id(id).await.unwrap_err(),
            SubscriptionError::NotFound
        ));
    }

    #[tokio::test]
    async fn delete_passes_both_keys_through() {
        let subscription_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_delete()
            .with(always(), eq(subscription_id), eq(user_id))
            .times(1)
            .returning(|_, _, _| Ok(0));

        let usecase = SubscriptionUseCase::new(Arc::new(subscription_repo), STORE_TIMEOUT);
        usecase.delete(subscription_id, user_id).await.unwrap();
    }

    #[tokio::test]
    async fn missing_row_is_not_found_and_store_failure_is_storage() {
        let missing_id = Uuid::new_v4();
        let broken_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_id()
            .with(always(), eq(missing_id))
            .returning(|_, _| Ok(None));
        subscription_repo
            .expect_find_by_id()
            .with(always(), eq(broken_id))
            .returning(|_, _| Err(anyhow!("connection refused")));

        let usecase = SubscriptionUseCase::new(Arc::new(subscription_repo), STORE_TIMEOUT);

        let err = usecase.get_by_id(missing_id).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::NotFound));
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);

        let err = usecase.get_by_id(broken_id).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Storage(_)));
        assert_eq!(
            err.status_code(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn listing_by_user_only_returns_owned_rows() {
        let (repo, usecase) = in_memory_usecase();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let now = Utc::now();

        repo.insert_row(row(alice, "Netflix", 990, now));
        repo.insert_row(row(alice, "Spotify", 299, now));
        repo.insert_row(row(bob, "Netflix", 990, now));

        let owned = usecase.list_by_user(alice).await.unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|sub| sub.user_id == alice));

        let everything = usecase.list_all().await.unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn total_cost_sums_only_matching_service_in_period() {
        let (_, usecase) = in_memory_usecase();
        let user_id = Uuid::new_v4();

        let netflix_id = usecase
            .create(create_model(user_id, "Netflix", 990))
            .await
            .unwrap();
        usecase
            .create(create_model(user_id, "Spotify", 299))
            .await
            .unwrap();

        // Query the month the row was stamped with, not the wall clock now.
        let started_at = usecase.get_by_id(netflix_id).await.unwrap().started_at;
        let this_month = month_year(started_at);
        let total = usecase
            .total_cost(user_id, "Netflix", &this_month, &this_month)
            .await
            .unwrap();

        assert_eq!(total, 990);
    }

    #[tokio::test]
    async fn total_cost_is_zero_when_nothing_matches() {
        let (repo, usecase) = in_memory_usecase();
        let user_id = Uuid::new_v4();

        let total = usecase
            .total_cost(user_id, "Netflix", "01-2025", "12-2025")
            .await
            .unwrap();
        assert_eq!(total, 0);

        repo.insert_row(row(
            user_id,
            "Netflix",
            990,
            Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(),
        ));
        let total = usecase
            .total_cost(user_id, "Netflix", "01-2025", "12-2025")
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn total_cost_includes_both_period_edges() {
        let (repo, usecase) = in_memory_usecase();
        let user_id = Uuid::new_v4();

        repo.insert_row(row(
            user_id,
            "Netflix",
            100,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ));
        repo.insert_row(row(
            user_id,
            "Netflix",
            200,
            Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap(),
        ));
        repo.insert_row(row(
            user_id,
            "Netflix",
            400,
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap(),
        ));

        let total = usecase
            .total_cost(user_id, "Netflix", "01-2025", "03-2025")
            .await
            .unwrap();
        assert_eq!(total, 300);
    }

    #[tokio::test]
    async fn inverted_period_yields_zero() {
        let (repo, usecase) = in_memory_usecase();
        let user_id = Uuid::new_v4();
        repo.insert_row(row(
            user_id,
            "Netflix",
            990,
            Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap(),
        ));

        let total = usecase
            .total_cost(user_id, "Netflix", "03-2025", "01-2025")
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn total_cost_passes_normalized_period_to_store() {
        let user_id = Uuid::new_v4();
        let expected = BillingPeriod {
            from: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap(),
        };

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_total_cost()
            .withf(move |_, id, _, period| *id == user_id && *period == expected)
            .times(1)
            .returning(|_, _, _, _| Ok(1290));

        let usecase = SubscriptionUseCase::new(Arc::new(subscription_repo), STORE_TIMEOUT);
        let total = usecase
            .total_cost(user_id, "Netflix", "01-2025", "03-2025")
            .await
            .unwrap();

        assert_eq!(total, 1290);
    }

    #[tokio::test]
    async fn malformed_period_is_rejected_before_any_store_call() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_total_cost().never();

        let usecase = SubscriptionUseCase::new(Arc::new(subscription_repo), STORE_TIMEOUT);
        let user_id = Uuid::new_v4();

        for (from, to) in [
            ("2025-01", "03-2025"),
            ("01-2025", "2025-03"),
            ("", "03-2025"),
            ("01-2025", ""),
        ] {
            let err = usecase
                .total_cost(user_id, "Netflix", from, to)
                .await
                .unwrap_err();
            assert!(
                matches!(err, SubscriptionError::Validation(_)),
                "expected validation error for {from:?}..{to:?}, got: {err}"
            );
        }

        let err = usecase
            .total_cost(user_id, "", "01-2025", "03-2025")
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Validation(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stalled_store_call_surfaces_as_storage_error() {
        let usecase = SubscriptionUseCase::new(
            Arc::new(StalledSubscriptionRepository),
            Duration::from_millis(20),
        );

        let err = usecase.list_all().await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Storage(_)));
        assert!(err.to_string().contains("timed out"));

        let err = usecase
            .total_cost(Uuid::new_v4(), "Netflix", "01-2025", "01-2025")
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Storage(_)));
    }

    #[tokio::test]
    async fn call_abandoned_at_deadline_never_commits() {
        let committed = Arc::new(AtomicUsize::new(0));
        let usecase = SubscriptionUseCase::new(
            Arc::new(BlockingSubscriptionRepository {
                connection_wait: Duration::from_millis(80),
                statement_time: Duration::ZERO,
                committed: Arc::clone(&committed),
            }),
            Duration::from_millis(20),
        );

        let err = usecase
            .create(create_model(Uuid::new_v4(), "Netflix", 990))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Storage(_)));
        assert!(err.to_string().contains("timed out"));

        // Let the blocking task get its connection and try to run.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(committed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn statement_started_before_deadline_reports_its_outcome() {
        let committed = Arc::new(AtomicUsize::new(0));
        let usecase = SubscriptionUseCase::new(
            Arc::new(BlockingSubscriptionRepository {
                connection_wait: Duration::ZERO,
                statement_time: Duration::from_millis(80),
                committed: Arc::clone(&committed),
            }),
            Duration::from_millis(20),
        );

        let result = usecase
            .create(create_model(Uuid::new_v4(), "Netflix", 990))
            .await;

        assert!(result.is_ok());
        assert_eq!(committed.load(Ordering::SeqCst), 1);
    }
}
