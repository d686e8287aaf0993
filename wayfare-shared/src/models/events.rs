use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::pii::Masked;

/// Published when a price alert fires.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct AlertTriggeredEvent {
    pub alert_id: Uuid,
    pub user_id: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub price: Decimal,
    pub max_price: Decimal,
    pub currency: String,
    pub notification_email: Masked<String>,
    pub trigger_count: i32,
    pub triggered_at: DateTime<Utc>,
}

impl AlertTriggeredEvent {
    pub const TOPIC: &'static str = "price.alert.triggered";
}
