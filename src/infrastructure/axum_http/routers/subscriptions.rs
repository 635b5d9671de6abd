use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    application::usecases::subscriptions::{SubscriptionError, SubscriptionUseCase},
    config::config_model::DotEnvyConfig,
    domain::{
        repositories::subscriptions::SubscriptionRepository,
        value_objects::subscriptions::{
            CreateSubscriptionModel, CreatedSubscriptionDto, TotalCostDto, UpdateSubscriptionModel,
        },
    },
    infrastructure::postgres::{
        postgres_connection::PgPoolSquad, repositories::subscriptions::SubscriptionPostgres,
    },
};

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TotalCostQuery {
    user_id: Option<String>,
    service_name: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let subscription_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let subscription_usecase = SubscriptionUseCase::new(
        Arc::new(subscription_repository),
        Duration::from_secs(config.database.statement_timeout),
    );

    router(Arc::new(subscription_usecase))
}

pub fn router<T>(subscription_usecase: Arc<SubscriptionUseCase<T>>) -> Router
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/", post(create::<T>).get(list::<T>))
        .route("/total", get(total_cost::<T>))
        .route(
            "/:id",
            get(get_by_id::<T>)
                .put(update::<T>)
                .delete(delete_subscription::<T>),
        )
        .with_state(subscription_usecase)
}

pub async fn create<T>(
    State(subscription_usecase): State<Arc<SubscriptionUseCase<T>>>,
    payload: Result<Json<CreateSubscriptionModel>, JsonRejection>,
) -> impl IntoResponse
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let create_model = match json_payload(payload) {
        Ok(model) => model,
        Err(err) => return err.into_response(),
    };

    match subscription_usecase.create(create_model).await {
        Ok(id) => (StatusCode::CREATED, Json(CreatedSubscriptionDto { id })).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn list<T>(
    State(subscription_usecase): State<Arc<SubscriptionUseCase<T>>>,
    Query(query): Query<OwnerQuery>,
) -> impl IntoResponse
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let result = match non_empty(query.user_id) {
        Some(raw_user_id) => match parse_uuid("user_id", &raw_user_id) {
            Ok(user_id) => subscription_usecase.list_by_user(user_id).await,
            Err(err) => return err.into_response(),
        },
        None => subscription_usecase.list_all().await,
    };

    match result {
        Ok(subscriptions) => Json(subscriptions).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn get_by_id<T>(
    State(subscription_usecase): State<Arc<SubscriptionUseCase<T>>>,
    Path(raw_id): Path<String>,
) -> impl IntoResponse
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let subscription_id = match parse_uuid("subscription id", &raw_id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };

    match subscription_usecase.get_by_id(subscription_id).await {
        Ok(subscription) => Json(subscription).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn update<T>(
    State(subscription_usecase): State<Arc<SubscriptionUseCase<T>>>,
    Path(raw_id): Path<String>,
    payload: Result<Json<UpdateSubscriptionModel>, JsonRejection>,
) -> impl IntoResponse
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let subscription_id = match parse_uuid("subscription id", &raw_id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };

    let update_model = match json_payload(payload) {
        Ok(model) => model,
        Err(err) => return err.into_response(),
    };

    match subscription_usecase
        .update(subscription_id, update_model)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "updated" }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn delete_subscription<T>(
    State(subscription_usecase): State<Arc<SubscriptionUseCase<T>>>,
    Path(raw_id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> impl IntoResponse
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let ids = parse_uuid("subscription id", &raw_id).and_then(|subscription_id| {
        let raw_user_id = non_empty(query.user_id).ok_or_else(|| {
            SubscriptionError::Validation("user_id is required".to_string())
        })?;
        Ok((subscription_id, parse_uuid("user_id", &raw_user_id)?))
    });

    let (subscription_id, user_id) = match ids {
        Ok(ids) => ids,
        Err(err) => return err.into_response(),
    };

    match subscription_usecase.delete(subscription_id, user_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn total_cost<T>(
    State(subscription_usecase): State<Arc<SubscriptionUseCase<T>>>,
    Query(query): Query<TotalCostQuery>,
) -> impl IntoResponse
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let (Some(raw_user_id), Some(service_name), Some(from), Some(to)) = (
        non_empty(query.user_id),
        non_empty(query.service_name),
        non_empty(query.from),
        non_empty(query.to),
    ) else {
        return SubscriptionError::Validation(
            "user_id, service_name, from and to are required".to_string(),
        )
        .into_response();
    };

    let user_id = match parse_uuid("user_id", &raw_user_id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };

    match subscription_usecase
        .total_cost(user_id, &service_name, &from, &to)
        .await
    {
        Ok(total_cost) => Json(TotalCostDto { total_cost }).into_response(),
        Err(err) => err.into_response(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, SubscriptionError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| SubscriptionError::Validation(format!("{field} must be a valid UUID")))
}

// Body rejections answer with the same `{code, message}` shape as every other
// client error.
fn json_payload<M>(payload: Result<Json<M>, JsonRejection>) -> Result<M, SubscriptionError> {
    payload
        .map(|Json(model)| model)
        .map_err(|rejection| SubscriptionError::Validation(rejection.body_text()))
}
