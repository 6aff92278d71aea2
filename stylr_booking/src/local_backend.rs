use crate::backend::BookingBackend;
use crate::chat::Message;
use crate::error::{BookingError, BookingResult};
use crate::types::{Booking, BookingStatus, DailyAvailability, Salon, Service};
use chrono::{DateTime, NaiveDate, Utc};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default)]
struct LocalStore {
    salons: HashMap<Uuid, Salon>,
    services: HashMap<Uuid, Service>,
    bookings: HashMap<Uuid, Booking>,
    availability: HashMap<Uuid, BTreeMap<NaiveDate, DailyAvailability>>,
    messages: HashMap<Uuid, Message>,
}

/// In-memory backend used when no database is configured. State is lost on restart.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    store: Arc<Mutex<LocalStore>>,
}

impl LocalBackend {
    fn store(&self) -> BookingResult<MutexGuard<'_, LocalStore>> {
        self.store
            .lock()
            .map_err(|_| BookingError::Database("Local store lock poisoned".into()))
    }
}

fn newest_first(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_unstable_by(|a, b| b.booking_time.cmp(&a.booking_time));
    bookings
}

impl BookingBackend for LocalBackend {
    fn salon(&self, id: Uuid) -> BookingResult<Option<Salon>> {
        Ok(self.store()?.salons.get(&id).cloned())
    }

    fn insert_salon(&self, salon: &Salon) -> BookingResult<()> {
        self.store()?.salons.insert(salon.id, salon.clone());
        Ok(())
    }

    fn update_salon(&self, salon: &Salon) -> BookingResult<()> {
        match self.store()?.salons.get_mut(&salon.id) {
            Some(stored) => {
                *stored = salon.clone();
                Ok(())
            }
            None => Err(BookingError::not_found("Salon not found")),
        }
    }

    fn service(&self, id: Uuid) -> BookingResult<Option<Service>> {
        Ok(self.store()?.services.get(&id).cloned())
    }

    fn insert_service(&self, service: &Service) -> BookingResult<()> {
        self.store()?.services.insert(service.id, service.clone());
        Ok(())
    }

    fn update_service(&self, service: &Service) -> BookingResult<()> {
        match self.store()?.services.get_mut(&service.id) {
            Some(stored) => {
                *stored = service.clone();
                Ok(())
            }
            None => Err(BookingError::not_found("Service not found")),
        }
    }

    fn bookings_overlapping(
        &self,
        service_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BookingResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .store()?
            .bookings
            .values()
            .filter(|booking| booking.service_id == service_id && booking.blocks_slot(from, to))
            .cloned()
            .collect();
        bookings.sort_unstable_by_key(|booking| booking.booking_time);
        Ok(bookings)
    }

    fn insert_booking_if_free(&self, booking: &Booking) -> BookingResult<()> {
        let mut store = self.store()?;
        let end = booking.end_time();
        let taken = store.bookings.values().any(|existing| {
            existing.service_id == booking.service_id
                && existing.blocks_slot(booking.booking_time, end)
        });
        if taken {
            debug!(service_id = %booking.service_id, time = %booking.booking_time, "Slot already taken");
            return Err(BookingError::conflict("Time slot is no longer available"));
        }
        store.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    fn booking(&self, id: Uuid) -> BookingResult<Option<Booking>> {
        Ok(self.store()?.bookings.get(&id).cloned())
    }

    fn bookings_for_customer(&self, customer_id: Uuid) -> BookingResult<Vec<Booking>> {
        let bookings = self
            .store()?
            .bookings
            .values()
            .filter(|booking| booking.customer_id == customer_id)
            .cloned()
            .collect();
        Ok(newest_first(bookings))
    }

    fn bookings_for_salon(&self, salon_id: Uuid) -> BookingResult<Vec<Booking>> {
        let bookings = self
            .store()?
            .bookings
            .values()
            .filter(|booking| booking.salon_id == salon_id)
            .cloned()
            .collect();
        Ok(newest_first(bookings))
    }

    fn update_booking_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let mut store = self.store()?;
        let booking = store
            .bookings
            .get_mut(&id)
            .ok_or_else(|| BookingError::not_found("Booking not found"))?;
        if booking.status != expected {
            return Err(BookingError::conflict(format!(
                "Booking is {} now",
                booking.status.as_str()
            )));
        }
        booking.status = next;
        booking.updated_at = updated_at;
        Ok(booking.clone())
    }

    fn daily_availability(
        &self,
        salon_id: Uuid,
        date: NaiveDate,
    ) -> BookingResult<Option<DailyAvailability>> {
        Ok(self
            .store()?
            .availability
            .get(&salon_id)
            .and_then(|days| days.get(&date))
            .cloned())
    }

    fn availability_between(
        &self,
        salon_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BookingResult<Vec<DailyAvailability>> {
        Ok(self
            .store()?
            .availability
            .get(&salon_id)
            .map(|days| days.range(from..=to).map(|(_, day)| day.clone()).collect())
            .unwrap_or_default())
    }

    fn replace_daily_availability(
        &self,
        salon_id: Uuid,
        availability: &DailyAvailability,
    ) -> BookingResult<()> {
        let mut store = self.store()?;
        let days = store.availability.entry(salon_id).or_default();
        if availability.hours.is_empty() {
            days.remove(&availability.date);
        } else {
            days.insert(availability.date, availability.clone());
        }
        Ok(())
    }

    fn remove_availability_before(&self, cutoff: NaiveDate) -> BookingResult<usize> {
        let mut store = self.store()?;
        let mut removed = 0;
        for days in store.availability.values_mut() {
            let kept = days.split_off(&cutoff);
            removed += days.values().map(|day| day.hours.len()).sum::<usize>();
            *days = kept;
        }
        info!(removed, %cutoff, "Removed outdated availability overrides");
        Ok(removed)
    }

    fn insert_message(&self, message: &Message) -> BookingResult<()> {
        self.store()?.messages.insert(message.id, message.clone());
        Ok(())
    }

    fn message(&self, id: Uuid) -> BookingResult<Option<Message>> {
        Ok(self.store()?.messages.get(&id).cloned())
    }

    fn update_message(&self, message: &Message) -> BookingResult<()> {
        match self.store()?.messages.get_mut(&message.id) {
            Some(stored) => {
                *stored = message.clone();
                Ok(())
            }
            None => Err(BookingError::not_found("Message not found")),
        }
    }

    fn conversation(&self, user_a: Uuid, user_b: Uuid) -> BookingResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .store()?
            .messages
            .values()
            .filter(|message| message.involves(user_a) && message.involves(user_b))
            .cloned()
            .collect();
        messages.sort_unstable_by_key(|message| message.sent_at);
        Ok(messages)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutils::{booking_fixture, salon_fixture, service_fixture};
    use crate::types::HourAvailability;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, hour, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, day).unwrap()
    }

    #[test]
    fn test_add_book_cancel_single_slot() {
        let backend = LocalBackend::default();
        let salon = salon_fixture(Uuid::new_v4());
        let service = service_fixture(salon.id, 60);
        backend.insert_salon(&salon).unwrap();
        backend.insert_service(&service).unwrap();

        let booking = booking_fixture(&service, Uuid::new_v4(), at(9));
        backend.insert_booking_if_free(&booking).unwrap();

        let overlapping = backend
            .bookings_overlapping(service.id, at(9), at(10))
            .unwrap();
        assert_eq!(overlapping, vec![booking.clone()]);

        let second = booking_fixture(&service, Uuid::new_v4(), at(9));
        assert!(matches!(
            backend.insert_booking_if_free(&second),
            Err(BookingError::Conflict(_))
        ));

        backend
            .update_booking_status(booking.id, BookingStatus::Pending, BookingStatus::Cancelled, at(8))
            .unwrap();
        assert!(backend
            .bookings_overlapping(service.id, at(9), at(10))
            .unwrap()
            .is_empty());
        backend.insert_booking_if_free(&second).unwrap();
    }

    #[test]
    fn test_bookings_of_other_services_do_not_conflict() {
        let backend = LocalBackend::default();
        let salon = salon_fixture(Uuid::new_v4());
        let haircut = service_fixture(salon.id, 60);
        let nails = service_fixture(salon.id, 60);

        backend
            .insert_booking_if_free(&booking_fixture(&haircut, Uuid::new_v4(), at(9)))
            .unwrap();
        backend
            .insert_booking_if_free(&booking_fixture(&nails, Uuid::new_v4(), at(9)))
            .unwrap();
    }

    #[test]
    fn test_partial_overlap_is_rejected() {
        let backend = LocalBackend::default();
        let salon = salon_fixture(Uuid::new_v4());
        let long_service = service_fixture(salon.id, 120);

        backend
            .insert_booking_if_free(&booking_fixture(&long_service, Uuid::new_v4(), at(9)))
            .unwrap();
        backend
            .insert_booking_if_free(&booking_fixture(&long_service, Uuid::new_v4(), at(10)))
            .unwrap_err();
        backend
            .insert_booking_if_free(&booking_fixture(&long_service, Uuid::new_v4(), at(11)))
            .unwrap();
    }

    #[test]
    fn test_stale_status_update_conflicts() {
        let backend = LocalBackend::default();
        let service = service_fixture(Uuid::new_v4(), 60);
        let booking = booking_fixture(&service, Uuid::new_v4(), at(9));
        backend.insert_booking_if_free(&booking).unwrap();

        backend
            .update_booking_status(booking.id, BookingStatus::Pending, BookingStatus::Confirmed, at(1))
            .unwrap();
        assert!(matches!(
            backend.update_booking_status(
                booking.id,
                BookingStatus::Pending,
                BookingStatus::Cancelled,
                at(2)
            ),
            Err(BookingError::Conflict(_))
        ));
        assert!(matches!(
            backend.update_booking_status(
                Uuid::new_v4(),
                BookingStatus::Pending,
                BookingStatus::Cancelled,
                at(2)
            ),
            Err(BookingError::NotFound(_))
        ));
    }

    #[test]
    fn test_customer_bookings_are_newest_first() {
        let backend = LocalBackend::default();
        let service = service_fixture(Uuid::new_v4(), 60);
        let customer = Uuid::new_v4();
        for hour in [9, 14, 11] {
            backend
                .insert_booking_if_free(&booking_fixture(&service, customer, at(hour)))
                .unwrap();
        }
        backend
            .insert_booking_if_free(&booking_fixture(&service, Uuid::new_v4(), at(16)))
            .unwrap();

        let bookings = backend.bookings_for_customer(customer).unwrap();
        let hours: Vec<DateTime<Utc>> = bookings.iter().map(|b| b.booking_time).collect();
        assert_eq!(hours, vec![at(14), at(11), at(9)]);
        assert_eq!(backend.bookings_for_salon(service.salon_id).unwrap().len(), 4);
    }

    #[test]
    fn test_replace_availability_overwrites_previous_hours() {
        let backend = LocalBackend::default();
        let salon_id = Uuid::new_v4();
        let closed = |hour| HourAvailability {
            hour,
            is_available: false,
        };

        backend
            .replace_daily_availability(
                salon_id,
                &DailyAvailability {
                    date: date(3),
                    hours: vec![closed(9), closed(10)],
                },
            )
            .unwrap();
        backend
            .replace_daily_availability(
                salon_id,
                &DailyAvailability {
                    date: date(3),
                    hours: vec![closed(15)],
                },
            )
            .unwrap();

        let stored = backend.daily_availability(salon_id, date(3)).unwrap().unwrap();
        assert_eq!(stored.hours, vec![closed(15)]);
        assert!(backend.daily_availability(salon_id, date(4)).unwrap().is_none());

        backend
            .replace_daily_availability(
                salon_id,
                &DailyAvailability {
                    date: date(3),
                    hours: vec![],
                },
            )
            .unwrap();
        assert!(backend.daily_availability(salon_id, date(3)).unwrap().is_none());
    }

    #[test]
    fn test_cleanup_outdated_availability() {
        let backend = LocalBackend::default();
        let salon_id = Uuid::new_v4();
        for day in [1, 2, 10] {
            backend
                .replace_daily_availability(
                    salon_id,
                    &DailyAvailability {
                        date: date(day),
                        hours: vec![
                            HourAvailability {
                                hour: 8,
                                is_available: false,
                            },
                            HourAvailability {
                                hour: 9,
                                is_available: false,
                            },
                        ],
                    },
                )
                .unwrap();
        }

        assert_eq!(backend.remove_availability_before(date(5)).unwrap(), 4);
        let remaining = backend
            .availability_between(salon_id, date(1), date(30))
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].date, date(10));
    }

    #[test]
    fn test_conversation_only_contains_both_participants() {
        let backend = LocalBackend::default();
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let first = Message::new(alice, bob, "Hello".into(), at(9));
        let reply = Message::new(bob, alice, "Hi".into(), at(9) + Duration::minutes(1));
        let other = Message::new(alice, carol, "Hey".into(), at(10));
        for message in [&reply, &first, &other] {
            backend.insert_message(message).unwrap();
        }

        let conversation = backend.conversation(bob, alice).unwrap();
        assert_eq!(conversation, vec![first, reply]);
    }
}
