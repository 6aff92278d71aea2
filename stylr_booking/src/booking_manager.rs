use crate::{
    availability::{
        booking_window, candidate_starts, local_today, parse_timezone, AvailabilityCalculator,
    },
    backend::BookingBackend,
    cache::TtlCache,
    chat::{Message, MessageStatus},
    clock::Clock,
    error::{BookingError, BookingResult},
    events::{EventKind, EventRelay},
    operating_hours::{normalize, OperatingHours},
    requests::{
        CreateBookingRequest, CreateSalonRequest, CreateServiceRequest, SendMessageRequest,
        UpdateAvailabilityRequest, UpdateSalonRequest, UpdateServiceRequest,
    },
    types::{
        Booking, BookingStatus, Caller, DailyAvailability, HourAvailability, Salon, Service, Slot,
        SlotStatus, DEFAULT_TIMEZONE,
    },
};
use chrono::{Days, NaiveDate};
use chrono_tz::Tz;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct BookingManager<T: BookingBackend> {
    backend: T,
    clock: Arc<dyn Clock>,
    relay: EventRelay,
    salons: TtlCache<Uuid, Salon>,
    services: TtlCache<Uuid, Service>,
    default_timezone: String,
}

fn operating_hours_setting(entries: Vec<OperatingHours>) -> Option<Vec<OperatingHours>> {
    if entries.is_empty() {
        None
    } else {
        Some(normalize(entries))
    }
}

impl<T: BookingBackend> BookingManager<T> {
    pub fn new(backend: T, clock: Arc<dyn Clock>, relay: EventRelay, cache_ttl: Duration) -> Self {
        Self {
            backend,
            clock,
            relay,
            salons: TtlCache::new(cache_ttl),
            services: TtlCache::new(cache_ttl),
            default_timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }

    /// Timezone given to salons created without one.
    pub fn with_default_timezone(mut self, timezone: String) -> BookingResult<Self> {
        parse_timezone(&timezone)?;
        self.default_timezone = timezone;
        Ok(self)
    }

    pub fn relay(&self) -> &EventRelay {
        &self.relay
    }

    fn salon_or_not_found(&self, id: Uuid) -> BookingResult<Salon> {
        self.salons
            .get_or_try_load(&id, || self.backend.salon(id))?
            .ok_or_else(|| BookingError::not_found("Salon not found"))
    }

    fn service_or_not_found(&self, id: Uuid) -> BookingResult<Service> {
        self.services
            .get_or_try_load(&id, || self.backend.service(id))?
            .ok_or_else(|| BookingError::not_found("Service not found"))
    }

    fn active_service(&self, id: Uuid) -> BookingResult<Service> {
        let service = self.service_or_not_found(id)?;
        if !service.active {
            return Err(BookingError::not_found("Service not found"));
        }
        Ok(service)
    }

    /// Active service plus its enabled salon and the salon's timezone.
    fn bookable(&self, service_id: Uuid) -> BookingResult<(Service, Salon, Tz)> {
        let service = self.active_service(service_id)?;
        let salon = self.salon_or_not_found(service.salon_id)?;
        if !salon.enabled {
            return Err(BookingError::forbidden("Salon is not accepting bookings"));
        }
        let tz = parse_timezone(&salon.timezone)?;
        Ok((service, salon, tz))
    }

    fn slots_for(
        &self,
        salon: &Salon,
        service: &Service,
        tz: Tz,
        date: NaiveDate,
    ) -> BookingResult<Vec<Slot>> {
        let starts = candidate_starts(salon, tz, date);
        let Some((from, to)) = booking_window(&starts, service.duration()) else {
            return Ok(vec![]);
        };

        let bookings = self.backend.bookings_overlapping(service.id, from, to)?;
        let overrides = self.backend.daily_availability(salon.id, date)?;
        let calculator = AvailabilityCalculator {
            duration: service.duration(),
            tz,
            now: self.clock.now(),
            bookings: &bookings,
            overrides: overrides.as_ref(),
        };
        Ok(calculator.slots(&starts))
    }

    /// Slots of `service_id` on `date`, a calendar day in the salon's timezone.
    pub fn availability(&self, service_id: Uuid, date: NaiveDate) -> BookingResult<Vec<Slot>> {
        let (service, salon, tz) = self.bookable(service_id)?;
        self.slots_for(&salon, &service, tz, date)
    }

    pub fn create_booking(
        &self,
        caller: &Caller,
        request: CreateBookingRequest,
    ) -> BookingResult<Booking> {
        let customer_id = caller.require_user()?;
        let (service, salon, tz) = self.bookable(request.service_id)?;

        let now = self.clock.now();
        if request.booking_time < now {
            return Err(BookingError::bad_request("Cannot book a time in the past"));
        }

        let date = request.booking_time.with_timezone(&tz).date_naive();
        let slots = self.slots_for(&salon, &service, tz, date)?;
        let slot = slots
            .iter()
            .find(|slot| slot.time == request.booking_time)
            .ok_or_else(|| {
                BookingError::bad_request(format!(
                    "{} is not a bookable start time",
                    request.booking_time
                ))
            })?;
        match slot.status {
            SlotStatus::Available => {}
            SlotStatus::Busy => {
                return Err(BookingError::conflict("Time slot is no longer available"))
            }
            SlotStatus::Unavailable => {
                return Err(BookingError::conflict("Time slot is closed by the salon"))
            }
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            service_id: service.id,
            salon_id: salon.id,
            customer_id,
            booking_time: request.booking_time,
            duration_minutes: service.duration_minutes,
            status: BookingStatus::Pending,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };
        self.backend.insert_booking_if_free(&booking)?;

        info!(booking_id = %booking.id, service_id = %service.id, time = %booking.booking_time, "Booking created");
        self.relay.publish(
            vec![customer_id, salon.owner_id],
            EventKind::BookingCreated {
                booking: booking.clone(),
            },
        );
        Ok(booking)
    }

    fn booking_or_not_found(&self, id: Uuid) -> BookingResult<Booking> {
        self.backend
            .booking(id)?
            .ok_or_else(|| BookingError::not_found("Booking not found"))
    }

    pub fn booking(&self, caller: &Caller, id: Uuid) -> BookingResult<Booking> {
        let booking = self.booking_or_not_found(id)?;
        if caller.admin || caller.is(booking.customer_id) {
            return Ok(booking);
        }
        let salon = self.salon_or_not_found(booking.salon_id)?;
        if caller.manages(&salon) {
            Ok(booking)
        } else {
            Err(BookingError::forbidden("You cannot view this booking"))
        }
    }

    pub fn my_bookings(&self, caller: &Caller) -> BookingResult<Vec<Booking>> {
        self.backend.bookings_for_customer(caller.require_user()?)
    }

    pub fn salon_bookings(&self, caller: &Caller, salon_id: Uuid) -> BookingResult<Vec<Booking>> {
        let salon = self.salon_or_not_found(salon_id)?;
        caller.ensure_manages(&salon)?;
        self.backend.bookings_for_salon(salon_id)
    }

    pub fn confirm_booking(&self, caller: &Caller, id: Uuid) -> BookingResult<Booking> {
        self.change_booking_status(caller, id, BookingStatus::Confirmed)
    }

    pub fn cancel_booking(&self, caller: &Caller, id: Uuid) -> BookingResult<Booking> {
        self.change_booking_status(caller, id, BookingStatus::Cancelled)
    }

    pub fn complete_booking(&self, caller: &Caller, id: Uuid) -> BookingResult<Booking> {
        self.change_booking_status(caller, id, BookingStatus::Completed)
    }

    /// Customers may only cancel; every other change belongs to the salon.
    fn change_booking_status(
        &self,
        caller: &Caller,
        id: Uuid,
        next: BookingStatus,
    ) -> BookingResult<Booking> {
        let booking = self.booking_or_not_found(id)?;
        let salon = self.salon_or_not_found(booking.salon_id)?;

        let allowed = caller.manages(&salon)
            || (next == BookingStatus::Cancelled && caller.is(booking.customer_id));
        if !allowed {
            return Err(BookingError::forbidden("You cannot change this booking"));
        }
        if !booking.status.can_transition_to(next) {
            return Err(BookingError::bad_request(format!(
                "Cannot move a {} booking to {}",
                booking.status.as_str(),
                next.as_str()
            )));
        }

        let updated =
            self.backend
                .update_booking_status(id, booking.status, next, self.clock.now())?;
        info!(booking_id = %id, status = next.as_str(), "Booking status changed");
        self.relay.publish(
            vec![updated.customer_id, salon.owner_id],
            EventKind::BookingStatusChanged {
                booking: updated.clone(),
            },
        );
        Ok(updated)
    }

    /// Current calendar day in the salon's timezone.
    pub fn salon_today(&self, salon_id: Uuid) -> BookingResult<NaiveDate> {
        let salon = self.salon_or_not_found(salon_id)?;
        let tz = parse_timezone(&salon.timezone)?;
        Ok(local_today(tz, self.clock.now()))
    }

    pub fn daily_availability(
        &self,
        salon_id: Uuid,
        date: NaiveDate,
    ) -> BookingResult<DailyAvailability> {
        self.salon_or_not_found(salon_id)?;
        let stored = self.backend.daily_availability(salon_id, date)?;
        Ok(DailyAvailability::full_day(date, stored.as_ref()))
    }

    /// Stored overrides of one month grouped by date.
    pub fn monthly_availability(
        &self,
        salon_id: Uuid,
        year: i32,
        month: u32,
    ) -> BookingResult<BTreeMap<NaiveDate, Vec<HourAvailability>>> {
        self.salon_or_not_found(salon_id)?;
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| BookingError::bad_request("Invalid year or month"))?;
        let last = first
            .checked_add_months(chrono::Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| BookingError::bad_request("Invalid year or month"))?;

        Ok(self
            .backend
            .availability_between(salon_id, first, last)?
            .into_iter()
            .map(|day| (day.date, day.hours))
            .collect())
    }

    /// Replaces the owner's override for `request.date` with `request.hours`.
    pub fn update_daily_availability(
        &self,
        caller: &Caller,
        salon_id: Uuid,
        request: UpdateAvailabilityRequest,
    ) -> BookingResult<DailyAvailability> {
        let salon = self.salon_or_not_found(salon_id)?;
        caller.ensure_manages(&salon)?;

        let tz = parse_timezone(&salon.timezone)?;
        if request.date < local_today(tz, self.clock.now()) {
            return Err(BookingError::bad_request(
                "Cannot change availability for a past date",
            ));
        }

        let mut hours: Vec<HourAvailability> = Vec::with_capacity(request.hours.len());
        for entry in request.hours {
            if entry.hour > 23 {
                return Err(BookingError::bad_request(format!(
                    "Hour {} is outside 0-23",
                    entry.hour
                )));
            }
            if hours.iter().any(|existing| existing.hour == entry.hour) {
                return Err(BookingError::bad_request(format!(
                    "Hour {} is listed twice",
                    entry.hour
                )));
            }
            hours.push(HourAvailability {
                hour: entry.hour,
                is_available: entry.is_available,
            });
        }
        hours.sort_unstable_by_key(|entry| entry.hour);

        let availability = DailyAvailability {
            date: request.date,
            hours,
        };
        self.backend
            .replace_daily_availability(salon_id, &availability)?;
        info!(%salon_id, date = %availability.date, hours = availability.hours.len(), "Availability updated");
        Ok(availability)
    }

    pub fn cleanup_outdated_availability(&self, retention_days: u64) -> BookingResult<usize> {
        let today = self.clock.now().date_naive();
        let Some(cutoff) = today.checked_sub_days(Days::new(retention_days)) else {
            warn!(retention_days, "Retention window reaches before the calendar start");
            return Ok(0);
        };
        self.backend.remove_availability_before(cutoff)
    }

    pub fn salon(&self, id: Uuid) -> BookingResult<Salon> {
        self.salon_or_not_found(id)
    }

    pub fn create_salon(&self, caller: &Caller, request: CreateSalonRequest) -> BookingResult<Salon> {
        let owner_id = caller.require_user()?;
        let timezone = request
            .timezone
            .unwrap_or_else(|| self.default_timezone.clone());
        parse_timezone(&timezone)?;

        let salon = Salon {
            id: Uuid::new_v4(),
            owner_id,
            name: request.name,
            timezone,
            enabled: true,
            operating_hours: request.operating_hours.and_then(operating_hours_setting),
        };
        self.backend.insert_salon(&salon)?;
        info!(salon_id = %salon.id, %owner_id, "Salon created");
        Ok(salon)
    }

    pub fn update_salon(
        &self,
        caller: &Caller,
        id: Uuid,
        request: UpdateSalonRequest,
    ) -> BookingResult<Salon> {
        let mut salon = self.salon_or_not_found(id)?;
        caller.ensure_manages(&salon)?;

        if let Some(name) = request.name {
            salon.name = name;
        }
        if let Some(timezone) = request.timezone {
            parse_timezone(&timezone)?;
            salon.timezone = timezone;
        }
        if let Some(enabled) = request.enabled {
            salon.enabled = enabled;
        }
        if let Some(operating_hours) = request.operating_hours {
            salon.operating_hours = operating_hours_setting(operating_hours);
        }

        self.backend.update_salon(&salon)?;
        self.salons.invalidate(&id);
        info!(salon_id = %id, enabled = salon.enabled, "Salon updated");
        Ok(salon)
    }

    pub fn service(&self, id: Uuid) -> BookingResult<Service> {
        self.active_service(id)
    }

    pub fn create_service(
        &self,
        caller: &Caller,
        salon_id: Uuid,
        request: CreateServiceRequest,
    ) -> BookingResult<Service> {
        let salon = self.salon_or_not_found(salon_id)?;
        caller.ensure_manages(&salon)?;

        let service = Service {
            id: Uuid::new_v4(),
            salon_id,
            name: request.name,
            duration_minutes: request.duration_minutes,
            price_cents: request.price_cents,
            active: true,
        };
        self.backend.insert_service(&service)?;
        info!(service_id = %service.id, %salon_id, "Service created");
        Ok(service)
    }

    pub fn update_service(
        &self,
        caller: &Caller,
        id: Uuid,
        request: UpdateServiceRequest,
    ) -> BookingResult<Service> {
        let mut service = self.service_or_not_found(id)?;
        let salon = self.salon_or_not_found(service.salon_id)?;
        caller.ensure_manages(&salon)?;

        if let Some(name) = request.name {
            service.name = name;
        }
        if let Some(duration_minutes) = request.duration_minutes {
            service.duration_minutes = duration_minutes;
        }
        if let Some(price_cents) = request.price_cents {
            service.price_cents = price_cents;
        }
        if let Some(active) = request.active {
            service.active = active;
        }

        self.backend.update_service(&service)?;
        self.services.invalidate(&id);
        Ok(service)
    }

    pub fn send_message(&self, caller: &Caller, request: SendMessageRequest) -> BookingResult<Message> {
        let sender_id = caller.require_user()?;
        if request.recipient_id == sender_id {
            return Err(BookingError::bad_request("Cannot send a message to yourself"));
        }

        let message = Message::new(sender_id, request.recipient_id, request.body, self.clock.now());
        self.backend.insert_message(&message)?;
        self.relay.publish(
            vec![sender_id, message.recipient_id],
            EventKind::MessageSent {
                message: message.clone(),
            },
        );
        Ok(message)
    }

    pub fn conversation(&self, caller: &Caller, other_user: Uuid) -> BookingResult<Vec<Message>> {
        self.backend
            .conversation(caller.require_user()?, other_user)
    }

    pub fn mark_delivered(&self, caller: &Caller, id: Uuid) -> BookingResult<Message> {
        self.advance_message(caller, id, MessageStatus::Delivered)
    }

    pub fn mark_read(&self, caller: &Caller, id: Uuid) -> BookingResult<Message> {
        self.advance_message(caller, id, MessageStatus::Read)
    }

    fn advance_message(
        &self,
        caller: &Caller,
        id: Uuid,
        next: MessageStatus,
    ) -> BookingResult<Message> {
        let mut message = self
            .backend
            .message(id)?
            .ok_or_else(|| BookingError::not_found("Message not found"))?;
        if !caller.is(message.recipient_id) {
            return Err(BookingError::forbidden(
                "Only the recipient can acknowledge a message",
            ));
        }

        if message.advance(next, self.clock.now()) {
            self.backend.update_message(&message)?;
            let kind = match (next, message.read_at, message.delivered_at) {
                (MessageStatus::Read, Some(read_at), _) => EventKind::MessageRead {
                    message_id: message.id,
                    read_at,
                },
                (_, _, Some(delivered_at)) => EventKind::MessageDelivered {
                    message_id: message.id,
                    delivered_at,
                },
                _ => return Ok(message),
            };
            self.relay
                .publish(vec![message.sender_id, message.recipient_id], kind);
        }
        Ok(message)
    }
}
