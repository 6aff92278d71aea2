use crate::{
    booking_manager::BookingManager,
    clock::MockClock,
    events::{EventRelay, RelayEvent},
    local_backend::LocalBackend,
    types::{Booking, BookingStatus, Salon, Service},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use uuid::Uuid;

/// Fixed "now" used by manager and HTTP tests: 2030-06-01T08:30:00Z, a Saturday.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, 8, 30, 0).unwrap()
}

pub fn fixed_clock(now: DateTime<Utc>) -> MockClock {
    let mut clock = MockClock::new();
    clock.expect_now().return_const(now);
    clock
}

pub fn salon_fixture(owner_id: Uuid) -> Salon {
    Salon {
        id: Uuid::new_v4(),
        owner_id,
        name: "Glow Studio".into(),
        timezone: "UTC".into(),
        enabled: true,
        operating_hours: None,
    }
}

pub fn service_fixture(salon_id: Uuid, duration_minutes: i32) -> Service {
    Service {
        id: Uuid::new_v4(),
        salon_id,
        name: "Wash and blow-dry".into(),
        duration_minutes,
        price_cents: 35_000,
        active: true,
    }
}

pub fn booking_fixture(service: &Service, customer_id: Uuid, time: DateTime<Utc>) -> Booking {
    Booking {
        id: Uuid::new_v4(),
        service_id: service.id,
        salon_id: service.salon_id,
        customer_id,
        booking_time: time,
        duration_minutes: service.duration_minutes,
        status: BookingStatus::Pending,
        notes: None,
        created_at: time - Duration::days(1),
        updated_at: time - Duration::days(1),
    }
}

pub struct Fixture {
    pub manager: BookingManager<LocalBackend>,
    pub backend: LocalBackend,
    pub relay: EventRelay,
    pub owner_id: Uuid,
    pub salon: Salon,
    pub service: Service,
}

/// One enabled UTC salon with a 60 minute service, clock frozen at [`test_now`].
pub fn fixture() -> Fixture {
    let backend = LocalBackend::default();
    let relay = EventRelay::new(16);
    let manager = BookingManager::new(
        backend.clone(),
        Arc::new(fixed_clock(test_now())),
        relay.clone(),
        std::time::Duration::from_secs(60),
    );

    let owner_id = Uuid::new_v4();
    let salon = salon_fixture(owner_id);
    let service = service_fixture(salon.id, 60);
    crate::backend::BookingBackend::insert_salon(&backend, &salon).unwrap();
    crate::backend::BookingBackend::insert_service(&backend, &service).unwrap();

    Fixture {
        manager,
        backend,
        relay,
        owner_id,
        salon,
        service,
    }
}

pub fn drain_events(receiver: &mut Receiver<RelayEvent>) -> Vec<RelayEvent> {
    let mut events = vec![];
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
