use crate::operating_hours::OperatingHours;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub service_id: Uuid,
    pub booking_time: DateTime<Utc>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HourUpdate {
    #[validate(range(max = 23))]
    pub hour: u32,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateAvailabilityRequest {
    pub date: NaiveDate,
    #[validate(length(max = 24), nested)]
    pub hours: Vec<HourUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DateQuery {
    pub date: NaiveDate,
}

/// Without a date the salon's current local day is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DayQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MonthQuery {
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
    #[validate(range(min = 1, max = 12))]
    pub month: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSalonRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub timezone: Option<String>,
    pub operating_hours: Option<Vec<OperatingHours>>,
}

/// Absent fields are left untouched. An empty `operatingHours` list resets the
/// salon to "open all day".
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSalonRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    pub timezone: Option<String>,
    pub enabled: Option<bool>,
    pub operating_hours: Option<Vec<OperatingHours>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: i32,
    #[validate(range(min = 0))]
    pub price_cents: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: Option<i32>,
    #[validate(range(min = 0))]
    pub price_cents: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
}
