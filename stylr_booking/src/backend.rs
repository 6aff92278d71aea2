use crate::chat::Message;
use crate::error::BookingResult;
use crate::types::{Booking, BookingStatus, DailyAvailability, Salon, Service};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Longest service a salon can offer. Storage uses it to bound overlap lookups.
pub const MAX_SERVICE_MINUTES: i32 = 24 * 60;

pub trait BookingBackend: Clone + Send + Sync + 'static {
    fn salon(&self, id: Uuid) -> BookingResult<Option<Salon>>;
    fn insert_salon(&self, salon: &Salon) -> BookingResult<()>;
    fn update_salon(&self, salon: &Salon) -> BookingResult<()>;

    fn service(&self, id: Uuid) -> BookingResult<Option<Service>>;
    fn insert_service(&self, service: &Service) -> BookingResult<()>;
    fn update_service(&self, service: &Service) -> BookingResult<()>;

    /// Non-cancelled bookings of `service_id` whose interval intersects `[from, to)`.
    fn bookings_overlapping(
        &self,
        service_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BookingResult<Vec<Booking>>;

    /// Stores `booking` unless a non-cancelled booking of the same service
    /// overlaps it. The check and the insert are atomic.
    fn insert_booking_if_free(&self, booking: &Booking) -> BookingResult<()>;

    fn booking(&self, id: Uuid) -> BookingResult<Option<Booking>>;
    fn bookings_for_customer(&self, customer_id: Uuid) -> BookingResult<Vec<Booking>>;
    fn bookings_for_salon(&self, salon_id: Uuid) -> BookingResult<Vec<Booking>>;

    /// Moves the booking from `expected` to `next`. Fails with `Conflict` when
    /// the stored status is no longer `expected`.
    fn update_booking_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> BookingResult<Booking>;

    fn daily_availability(
        &self,
        salon_id: Uuid,
        date: NaiveDate,
    ) -> BookingResult<Option<DailyAvailability>>;
    /// Overrides for dates in `[from, to]`, ordered by date.
    fn availability_between(
        &self,
        salon_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BookingResult<Vec<DailyAvailability>>;
    /// Replaces every stored hour of `(salon_id, availability.date)`.
    fn replace_daily_availability(
        &self,
        salon_id: Uuid,
        availability: &DailyAvailability,
    ) -> BookingResult<()>;
    /// Returns the number of removed hour records.
    fn remove_availability_before(&self, cutoff: NaiveDate) -> BookingResult<usize>;

    fn insert_message(&self, message: &Message) -> BookingResult<()>;
    fn message(&self, id: Uuid) -> BookingResult<Option<Message>>;
    fn update_message(&self, message: &Message) -> BookingResult<()>;
    /// Messages exchanged between two users, oldest first.
    fn conversation(&self, user_a: Uuid, user_b: Uuid) -> BookingResult<Vec<Message>>;
}
