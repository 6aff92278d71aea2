use crate::backend::{BookingBackend, MAX_SERVICE_MINUTES};
use crate::chat::{Message, MessageStatus};
use crate::error::{BookingError, BookingResult};
use crate::operating_hours::OperatingHours;
use crate::schema::{availability_overrides, bookings, messages, salons, services};
use crate::types::{
    Booking, BookingStatus, DailyAvailability, HourAvailability, Salon, Service,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::{Connection, ConnectionError, PgConnection};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

#[derive(Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = salons)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
struct SalonRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    timezone: String,
    enabled: bool,
    operating_hours: Option<serde_json::Value>,
}

impl TryFrom<&Salon> for SalonRow {
    type Error = BookingError;

    fn try_from(salon: &Salon) -> Result<Self, Self::Error> {
        let operating_hours = salon
            .operating_hours
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| BookingError::Database(err.to_string()))?;
        Ok(Self {
            id: salon.id,
            owner_id: salon.owner_id,
            name: salon.name.clone(),
            timezone: salon.timezone.clone(),
            enabled: salon.enabled,
            operating_hours,
        })
    }
}

impl TryFrom<SalonRow> for Salon {
    type Error = BookingError;

    fn try_from(row: SalonRow) -> Result<Self, Self::Error> {
        let operating_hours = row
            .operating_hours
            .map(serde_json::from_value::<Vec<OperatingHours>>)
            .transpose()
            .map_err(|err| {
                BookingError::Database(format!("Corrupt operating hours of salon {}: {err}", row.id))
            })?;
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            timezone: row.timezone,
            enabled: row.enabled,
            operating_hours,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = services)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ServiceRow {
    id: Uuid,
    salon_id: Uuid,
    name: String,
    duration_minutes: i32,
    price_cents: i64,
    active: bool,
}

impl From<&Service> for ServiceRow {
    fn from(service: &Service) -> Self {
        Self {
            id: service.id,
            salon_id: service.salon_id,
            name: service.name.clone(),
            duration_minutes: service.duration_minutes,
            price_cents: service.price_cents,
            active: service.active,
        }
    }
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Self {
            id: row.id,
            salon_id: row.salon_id,
            name: row.name,
            duration_minutes: row.duration_minutes,
            price_cents: row.price_cents,
            active: row.active,
        }
    }
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct BookingRow {
    id: Uuid,
    service_id: Uuid,
    salon_id: Uuid,
    customer_id: Uuid,
    booking_time: DateTime<Utc>,
    duration_minutes: i32,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Booking> for BookingRow {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            service_id: booking.service_id,
            salon_id: booking.salon_id,
            customer_id: booking.customer_id,
            booking_time: booking.booking_time,
            duration_minutes: booking.duration_minutes,
            status: booking.status.as_str().to_string(),
            notes: booking.notes.clone(),
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = BookingError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::parse(&row.status).ok_or_else(|| {
            BookingError::Database(format!("Unknown booking status '{}'", row.status))
        })?;
        Ok(Self {
            id: row.id,
            service_id: row.service_id,
            salon_id: row.salon_id,
            customer_id: row.customer_id,
            booking_time: row.booking_time,
            duration_minutes: row.duration_minutes,
            status,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = availability_overrides)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct OverrideRow {
    salon_id: Uuid,
    date: NaiveDate,
    hour: i32,
    is_available: bool,
}

#[derive(Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
struct MessageRow {
    id: Uuid,
    sender_id: Uuid,
    recipient_id: Uuid,
    body: String,
    status: String,
    sent_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    read_at: Option<DateTime<Utc>>,
}

impl From<&Message> for MessageRow {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            body: message.body.clone(),
            status: message.status.as_str().to_string(),
            sent_at: message.sent_at,
            delivered_at: message.delivered_at,
            read_at: message.read_at,
        }
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = BookingError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let status = MessageStatus::parse(&row.status).ok_or_else(|| {
            BookingError::Database(format!("Unknown message status '{}'", row.status))
        })?;
        Ok(Self {
            id: row.id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            body: row.body,
            status,
            sent_at: row.sent_at,
            delivered_at: row.delivered_at,
            read_at: row.read_at,
        })
    }
}

fn group_by_date(rows: Vec<OverrideRow>) -> Vec<DailyAvailability> {
    let mut days: Vec<DailyAvailability> = vec![];
    for row in rows {
        let hour = HourAvailability {
            hour: row.hour as u32,
            is_available: row.is_available,
        };
        match days.last_mut() {
            Some(day) if day.date == row.date => day.hours.push(hour),
            _ => days.push(DailyAvailability {
                date: row.date,
                hours: vec![hour],
            }),
        }
    }
    days
}

fn convert_bookings(rows: Vec<BookingRow>) -> BookingResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[derive(Clone)]
pub struct DatabaseInterface {
    connection: Arc<Mutex<PgConnection>>,
}

impl DatabaseInterface {
    pub fn new(database_url: &str) -> Result<Self, ConnectionError> {
        let connection = Self::establish_connection(database_url)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn establish_connection(database_url: &str) -> Result<PgConnection, ConnectionError> {
        PgConnection::establish(database_url)
    }

    fn connection(&self) -> BookingResult<MutexGuard<'_, PgConnection>> {
        self.connection
            .lock()
            .map_err(|_| BookingError::Database("Database connection lock poisoned".into()))
    }
}

/// Non-cancelled bookings of `service_id` that could intersect `[from, to)`.
fn load_live_bookings(
    connection: &mut PgConnection,
    service_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> BookingResult<Vec<Booking>> {
    let rows = bookings::table
        .filter(bookings::service_id.eq(service_id))
        .filter(bookings::status.ne(BookingStatus::Cancelled.as_str()))
        .filter(bookings::booking_time.lt(to))
        .filter(bookings::booking_time.gt(from - Duration::minutes(i64::from(MAX_SERVICE_MINUTES))))
        .order(bookings::booking_time.asc())
        .select(BookingRow::as_select())
        .load(connection)?;
    Ok(convert_bookings(rows)?
        .into_iter()
        .filter(|booking| booking.blocks_slot(from, to))
        .collect())
}

impl BookingBackend for DatabaseInterface {
    fn salon(&self, id: Uuid) -> BookingResult<Option<Salon>> {
        let mut connection = self.connection()?;
        salons::table
            .find(id)
            .select(SalonRow::as_select())
            .first(&mut *connection)
            .optional()?
            .map(Salon::try_from)
            .transpose()
    }

    fn insert_salon(&self, salon: &Salon) -> BookingResult<()> {
        let row = SalonRow::try_from(salon)?;
        let mut connection = self.connection()?;
        diesel::insert_into(salons::table)
            .values(&row)
            .execute(&mut *connection)?;
        Ok(())
    }

    fn update_salon(&self, salon: &Salon) -> BookingResult<()> {
        let row = SalonRow::try_from(salon)?;
        let mut connection = self.connection()?;
        match diesel::update(salons::table.find(salon.id))
            .set(&row)
            .execute(&mut *connection)?
        {
            0 => Err(BookingError::not_found("Salon not found")),
            _ => Ok(()),
        }
    }

    fn service(&self, id: Uuid) -> BookingResult<Option<Service>> {
        let mut connection = self.connection()?;
        Ok(services::table
            .find(id)
            .select(ServiceRow::as_select())
            .first(&mut *connection)
            .optional()?
            .map(Service::from))
    }

    fn insert_service(&self, service: &Service) -> BookingResult<()> {
        let mut connection = self.connection()?;
        diesel::insert_into(services::table)
            .values(ServiceRow::from(service))
            .execute(&mut *connection)?;
        Ok(())
    }

    fn update_service(&self, service: &Service) -> BookingResult<()> {
        let mut connection = self.connection()?;
        match diesel::update(services::table.find(service.id))
            .set(ServiceRow::from(service))
            .execute(&mut *connection)?
        {
            0 => Err(BookingError::not_found("Service not found")),
            _ => Ok(()),
        }
    }

    fn bookings_overlapping(
        &self,
        service_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BookingResult<Vec<Booking>> {
        let mut connection = self.connection()?;
        load_live_bookings(&mut connection, service_id, from, to)
    }

    fn insert_booking_if_free(&self, booking: &Booking) -> BookingResult<()> {
        let mut connection = self.connection()?;
        connection.transaction::<_, BookingError, _>(|connection| {
            // Row lock on the service queues bookings of that service, so the
            // overlap check below sees every booking committed before it.
            services::table
                .find(booking.service_id)
                .select(services::id)
                .for_update()
                .first::<Uuid>(connection)
                .optional()?
                .ok_or_else(|| BookingError::not_found("Service not found"))?;

            let clashing = load_live_bookings(
                connection,
                booking.service_id,
                booking.booking_time,
                booking.end_time(),
            )?;
            if !clashing.is_empty() {
                return Err(BookingError::conflict("Time slot is no longer available"));
            }
            diesel::insert_into(bookings::table)
                .values(BookingRow::from(booking))
                .execute(connection)?;
            Ok(())
        })
    }

    fn booking(&self, id: Uuid) -> BookingResult<Option<Booking>> {
        let mut connection = self.connection()?;
        bookings::table
            .find(id)
            .select(BookingRow::as_select())
            .first(&mut *connection)
            .optional()?
            .map(Booking::try_from)
            .transpose()
    }

    fn bookings_for_customer(&self, customer_id: Uuid) -> BookingResult<Vec<Booking>> {
        let mut connection = self.connection()?;
        let rows = bookings::table
            .filter(bookings::customer_id.eq(customer_id))
            .order(bookings::booking_time.desc())
            .select(BookingRow::as_select())
            .load(&mut *connection)?;
        convert_bookings(rows)
    }

    fn bookings_for_salon(&self, salon_id: Uuid) -> BookingResult<Vec<Booking>> {
        let mut connection = self.connection()?;
        let rows = bookings::table
            .filter(bookings::salon_id.eq(salon_id))
            .order(bookings::booking_time.desc())
            .select(BookingRow::as_select())
            .load(&mut *connection)?;
        convert_bookings(rows)
    }

    fn update_booking_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let mut connection = self.connection()?;
        let updated = diesel::update(
            bookings::table
                .find(id)
                .filter(bookings::status.eq(expected.as_str())),
        )
        .set((
            bookings::status.eq(next.as_str()),
            bookings::updated_at.eq(updated_at),
        ))
        .returning(BookingRow::as_returning())
        .get_result(&mut *connection)
        .optional()?;

        match updated {
            Some(row) => Booking::try_from(row),
            None => {
                let exists: i64 = bookings::table
                    .find(id)
                    .count()
                    .get_result(&mut *connection)?;
                if exists == 0 {
                    Err(BookingError::not_found("Booking not found"))
                } else {
                    Err(BookingError::conflict("Booking status changed concurrently"))
                }
            }
        }
    }

    fn daily_availability(
        &self,
        salon_id: Uuid,
        date: NaiveDate,
    ) -> BookingResult<Option<DailyAvailability>> {
        Ok(self
            .availability_between(salon_id, date, date)?
            .into_iter()
            .next())
    }

    fn availability_between(
        &self,
        salon_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BookingResult<Vec<DailyAvailability>> {
        let mut connection = self.connection()?;
        let rows = availability_overrides::table
            .filter(availability_overrides::salon_id.eq(salon_id))
            .filter(availability_overrides::date.between(from, to))
            .order((
                availability_overrides::date.asc(),
                availability_overrides::hour.asc(),
            ))
            .select(OverrideRow::as_select())
            .load(&mut *connection)?;
        Ok(group_by_date(rows))
    }

    fn replace_daily_availability(
        &self,
        salon_id: Uuid,
        availability: &DailyAvailability,
    ) -> BookingResult<()> {
        let rows: Vec<OverrideRow> = availability
            .hours
            .iter()
            .map(|entry| OverrideRow {
                salon_id,
                date: availability.date,
                hour: entry.hour as i32,
                is_available: entry.is_available,
            })
            .collect();

        let mut connection = self.connection()?;
        connection.transaction::<_, BookingError, _>(|connection| {
            diesel::delete(
                availability_overrides::table
                    .filter(availability_overrides::salon_id.eq(salon_id))
                    .filter(availability_overrides::date.eq(availability.date)),
            )
            .execute(connection)?;
            if !rows.is_empty() {
                diesel::insert_into(availability_overrides::table)
                    .values(&rows)
                    .execute(connection)?;
            }
            Ok(())
        })
    }

    fn remove_availability_before(&self, cutoff: NaiveDate) -> BookingResult<usize> {
        let mut connection = self.connection()?;
        let removed = diesel::delete(
            availability_overrides::table.filter(availability_overrides::date.lt(cutoff)),
        )
        .execute(&mut *connection)?;
        info!(removed, %cutoff, "Removed outdated availability overrides");
        Ok(removed)
    }

    fn insert_message(&self, message: &Message) -> BookingResult<()> {
        let mut connection = self.connection()?;
        diesel::insert_into(messages::table)
            .values(MessageRow::from(message))
            .execute(&mut *connection)?;
        Ok(())
    }

    fn message(&self, id: Uuid) -> BookingResult<Option<Message>> {
        let mut connection = self.connection()?;
        messages::table
            .find(id)
            .select(MessageRow::as_select())
            .first(&mut *connection)
            .optional()?
            .map(Message::try_from)
            .transpose()
    }

    fn update_message(&self, message: &Message) -> BookingResult<()> {
        let mut connection = self.connection()?;
        match diesel::update(messages::table.find(message.id))
            .set(MessageRow::from(message))
            .execute(&mut *connection)?
        {
            0 => Err(BookingError::not_found("Message not found")),
            _ => Ok(()),
        }
    }

    fn conversation(&self, user_a: Uuid, user_b: Uuid) -> BookingResult<Vec<Message>> {
        let mut connection = self.connection()?;
        let rows = messages::table
            .filter(
                messages::sender_id
                    .eq(user_a)
                    .and(messages::recipient_id.eq(user_b))
                    .or(messages::sender_id
                        .eq(user_b)
                        .and(messages::recipient_id.eq(user_a))),
            )
            .order(messages::sent_at.asc())
            .select(MessageRow::as_select())
            .load(&mut *connection)?;
        rows.into_iter().map(Message::try_from).collect()
    }
}
