use crate::error::{BookingError, BookingResult};
use crate::operating_hours::OperatingHours;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TIMEZONE: &str = "Africa/Johannesburg";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Salon {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub timezone: String,
    pub enabled: bool,
    /// `None` means the owner never configured hours and the whole day is open.
    pub operating_hours: Option<Vec<OperatingHours>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub salon_id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub price_cents: i64,
    pub active: bool,
}

impl Service {
    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "COMPLETED" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub service_id: Uuid,
    pub salon_id: Uuid,
    pub customer_id: Uuid,
    pub booking_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.booking_time + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Half-open interval intersection against `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.booking_time < end && start < self.end_time()
    }

    pub fn blocks_slot(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.status != BookingStatus::Cancelled && self.overlaps(start, end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Busy,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub time: DateTime<Utc>,
    pub available: bool,
    pub status: SlotStatus,
}

impl Slot {
    pub fn new(time: DateTime<Utc>, status: SlotStatus) -> Self {
        Self {
            time,
            available: status == SlotStatus::Available,
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourAvailability {
    pub hour: u32,
    pub is_available: bool,
}

/// Owner override for one salon and calendar day. Hours not listed are open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAvailability {
    pub date: NaiveDate,
    pub hours: Vec<HourAvailability>,
}

impl DailyAvailability {
    pub fn is_hour_closed(&self, hour: u32) -> bool {
        self.hours
            .iter()
            .any(|entry| entry.hour == hour && !entry.is_available)
    }

    /// All 24 hours of the day, filling unlisted hours as available.
    pub fn full_day(date: NaiveDate, stored: Option<&DailyAvailability>) -> Self {
        let hours = (0..24)
            .map(|hour| HourAvailability {
                hour,
                is_available: stored.map_or(true, |stored| !stored.is_hour_closed(hour)),
            })
            .collect();
        Self { date, hours }
    }
}

/// Identity of the party behind a request as asserted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Caller {
    pub user_id: Option<Uuid>,
    pub admin: bool,
}

impl Caller {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            admin: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            user_id: None,
            admin: true,
        }
    }

    pub fn require_user(&self) -> BookingResult<Uuid> {
        self.user_id
            .ok_or_else(|| BookingError::bad_request("This action needs a user id"))
    }

    pub fn is(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id)
    }

    pub fn manages(&self, salon: &Salon) -> bool {
        self.admin || self.is(salon.owner_id)
    }

    pub fn ensure_manages(&self, salon: &Salon) -> BookingResult<()> {
        if self.manages(salon) {
            Ok(())
        } else {
            Err(BookingError::forbidden("You do not own this salon"))
        }
    }
}
