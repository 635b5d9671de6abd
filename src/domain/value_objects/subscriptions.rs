use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::subscriptions::SubscriptionEntity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionModel {
    pub id: Uuid,
    pub service_name: String,
    pub service_price: i32,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<SubscriptionEntity> for SubscriptionModel {
    fn from(value: SubscriptionEntity) -> Self {
        Self {
            id: value.id,
            service_name: value.service_name,
            service_price: value.service_price,
            user_id: value.user_id,
            started_at: value.started_at,
            ended_at: value.ended_at,
        }
    }
}

/// Create request body. `started_at` is always stamped by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateSubscriptionModel {
    pub service_name: String,
    pub service_price: i32,
    pub user_id: Uuid,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Update request body. The subscription id comes from the path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateSubscriptionModel {
    pub service_name: String,
    pub service_price: i32,
    pub user_id: Uuid,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedSubscriptionDto {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TotalCostDto {
    pub total_cost: i64,
}
