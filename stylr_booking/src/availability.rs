//! Slot computation for a service on one calendar day.
//!
//! Slots are derived on every query from the salon's operating hours, the
//! existing bookings of the service and the owner's hourly overrides. Nothing
//! here touches storage.

use crate::error::{BookingError, BookingResult};
use crate::operating_hours::window_for;
use crate::types::{Booking, DailyAvailability, Salon, Slot, SlotStatus};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

const SLOT_STEP_MINUTES: usize = 60;

pub fn parse_timezone(name: &str) -> BookingResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| BookingError::bad_request(format!("Unknown timezone '{name}'")))
}

/// Start times offered on `date`, in chronological order. Local times that do
/// not exist because of a DST gap are skipped.
pub fn candidate_starts(salon: &Salon, tz: Tz, date: NaiveDate) -> Vec<DateTime<Utc>> {
    let Some((open, close)) = window_for(salon.operating_hours.as_deref(), date.weekday()) else {
        return vec![];
    };

    (open..close)
        .step_by(SLOT_STEP_MINUTES)
        .filter_map(|minute| date.and_hms_opt(minute / 60, minute % 60, 0))
        .filter_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|start| start.with_timezone(&Utc))
        .collect()
}

/// Today's calendar date in the salon's timezone.
pub fn local_today(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

pub struct AvailabilityCalculator<'a> {
    pub duration: Duration,
    pub tz: Tz,
    pub now: DateTime<Utc>,
    pub bookings: &'a [Booking],
    pub overrides: Option<&'a DailyAvailability>,
}

impl AvailabilityCalculator<'_> {
    /// Past beats busy, busy beats an owner closure.
    pub fn status_at(&self, start: DateTime<Utc>) -> SlotStatus {
        if start < self.now {
            return SlotStatus::Unavailable;
        }

        let end = start + self.duration;
        if self
            .bookings
            .iter()
            .any(|booking| booking.blocks_slot(start, end))
        {
            return SlotStatus::Busy;
        }

        let local_hour = start.with_timezone(&self.tz).hour();
        if self
            .overrides
            .is_some_and(|overrides| overrides.is_hour_closed(local_hour))
        {
            return SlotStatus::Unavailable;
        }

        SlotStatus::Available
    }

    pub fn slots(&self, starts: &[DateTime<Utc>]) -> Vec<Slot> {
        starts
            .iter()
            .map(|start| Slot::new(*start, self.status_at(*start)))
            .collect()
    }
}

/// Interval that bookings must intersect to matter for `starts`.
pub fn booking_window(
    starts: &[DateTime<Utc>],
    duration: Duration,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = starts.first()?;
    let last = starts.last()?;
    Some((*first, *last + duration))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operating_hours::OperatingHours;
    use crate::types::{BookingStatus, HourAvailability, DEFAULT_TIMEZONE};
    use chrono::Weekday;
    use uuid::Uuid;

    fn salon(operating_hours: Option<Vec<OperatingHours>>) -> Salon {
        Salon {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Glow Studio".into(),
            timezone: "UTC".into(),
            enabled: true,
            operating_hours,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap()
    }

    fn booking(time: DateTime<Utc>, duration_minutes: i32, status: BookingStatus) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            salon_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            booking_time: time,
            duration_minutes,
            status,
            notes: None,
            created_at: time,
            updated_at: time,
        }
    }

    fn june_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_unconfigured_salon_offers_every_hour() {
        let starts = candidate_starts(&salon(None), Tz::UTC, june_first());
        assert_eq!(starts.len(), 24);
        assert_eq!(starts[0], at(0, 0));
        assert_eq!(starts[23], at(23, 0));
    }

    #[test]
    fn test_operating_window_limits_starts() {
        // 2024-06-01 is a Saturday
        let hours = vec![OperatingHours {
            day: Weekday::Sat,
            open_minute: 9 * 60 + 30,
            close_minute: 13 * 60,
        }];
        let starts = candidate_starts(&salon(Some(hours)), Tz::UTC, june_first());
        assert_eq!(starts, vec![at(9, 30), at(10, 30), at(11, 30), at(12, 30)]);
    }

    #[test]
    fn test_closed_weekday_has_no_starts() {
        let hours = vec![OperatingHours {
            day: Weekday::Mon,
            open_minute: 9 * 60,
            close_minute: 17 * 60,
        }];
        assert!(candidate_starts(&salon(Some(hours)), Tz::UTC, june_first()).is_empty());
    }

    #[test]
    fn test_starts_follow_salon_timezone() {
        let tz = parse_timezone(DEFAULT_TIMEZONE).unwrap();
        let starts = candidate_starts(&salon(None), tz, june_first());
        // Johannesburg is UTC+2 all year
        assert_eq!(starts[0], Utc.with_ymd_and_hms(2024, 5, 31, 22, 0, 0).unwrap());
        assert_eq!(starts.len(), 24);
    }

    #[test]
    fn test_dst_gap_hour_is_skipped() {
        let tz = parse_timezone("Europe/Berlin").unwrap();
        let spring_forward = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let starts = candidate_starts(&salon(None), tz, spring_forward);
        assert_eq!(starts.len(), 23);
    }

    #[test]
    fn test_dst_repeated_hour_is_offered_once() {
        let tz = parse_timezone("Europe/Berlin").unwrap();
        let fall_back = NaiveDate::from_ymd_opt(2024, 10, 27).unwrap();
        let starts = candidate_starts(&salon(None), tz, fall_back);

        assert_eq!(starts.len(), 24);
        assert!(starts.windows(2).all(|pair| pair[0] < pair[1]));
        // 02:00 local resolves to its first occurrence, still in summer time
        assert_eq!(starts[2], Utc.with_ymd_and_hms(2024, 10, 27, 0, 0, 0).unwrap());
        assert_eq!(starts[3], Utc.with_ymd_and_hms(2024, 10, 27, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(BookingError::BadRequest(_))
        ));
    }

    #[test]
    fn test_documented_example() {
        let bookings = vec![booking(at(9, 0), 60, BookingStatus::Confirmed)];
        let calculator = AvailabilityCalculator {
            duration: Duration::minutes(60),
            tz: Tz::UTC,
            now: at(8, 30),
            bookings: &bookings,
            overrides: None,
        };

        assert_eq!(calculator.status_at(at(8, 0)), SlotStatus::Unavailable);
        assert_eq!(calculator.status_at(at(9, 0)), SlotStatus::Busy);
        assert_eq!(calculator.status_at(at(10, 0)), SlotStatus::Available);
    }

    #[test]
    fn test_longer_service_overlaps_neighbouring_booking() {
        let bookings = vec![booking(at(11, 0), 30, BookingStatus::Pending)];
        let calculator = AvailabilityCalculator {
            duration: Duration::minutes(90),
            tz: Tz::UTC,
            now: at(0, 0),
            bookings: &bookings,
            overrides: None,
        };

        assert_eq!(calculator.status_at(at(10, 0)), SlotStatus::Busy);
        assert_eq!(calculator.status_at(at(11, 0)), SlotStatus::Busy);
        assert_eq!(calculator.status_at(at(12, 0)), SlotStatus::Available);
        assert_eq!(calculator.status_at(at(9, 0)), SlotStatus::Available);
    }

    #[test]
    fn test_cancelled_booking_frees_slot() {
        let bookings = vec![booking(at(9, 0), 60, BookingStatus::Cancelled)];
        let calculator = AvailabilityCalculator {
            duration: Duration::minutes(60),
            tz: Tz::UTC,
            now: at(0, 0),
            bookings: &bookings,
            overrides: None,
        };
        assert_eq!(calculator.status_at(at(9, 0)), SlotStatus::Available);
    }

    #[test]
    fn test_override_closes_hour_but_never_reopens_busy_slot() {
        let bookings = vec![booking(at(9, 0), 60, BookingStatus::Pending)];
        let overrides = DailyAvailability {
            date: june_first(),
            hours: vec![
                HourAvailability {
                    hour: 9,
                    is_available: true,
                },
                HourAvailability {
                    hour: 14,
                    is_available: false,
                },
            ],
        };
        let calculator = AvailabilityCalculator {
            duration: Duration::minutes(60),
            tz: Tz::UTC,
            now: at(0, 0),
            bookings: &bookings,
            overrides: Some(&overrides),
        };

        assert_eq!(calculator.status_at(at(9, 0)), SlotStatus::Busy);
        assert_eq!(calculator.status_at(at(14, 0)), SlotStatus::Unavailable);
        assert_eq!(calculator.status_at(at(15, 0)), SlotStatus::Available);
    }

    #[test]
    fn test_past_wins_over_booking_and_override() {
        let bookings = vec![booking(at(9, 0), 60, BookingStatus::Pending)];
        let overrides = DailyAvailability {
            date: june_first(),
            hours: vec![HourAvailability {
                hour: 9,
                is_available: false,
            }],
        };
        let calculator = AvailabilityCalculator {
            duration: Duration::minutes(60),
            tz: Tz::UTC,
            now: at(12, 0),
            bookings: &bookings,
            overrides: Some(&overrides),
        };
        assert_eq!(calculator.status_at(at(9, 0)), SlotStatus::Unavailable);
    }

    #[test]
    fn test_override_hour_uses_local_time() {
        let tz = parse_timezone(DEFAULT_TIMEZONE).unwrap();
        let overrides = DailyAvailability {
            date: june_first(),
            hours: vec![HourAvailability {
                hour: 10,
                is_available: false,
            }],
        };
        let calculator = AvailabilityCalculator {
            duration: Duration::minutes(60),
            tz,
            now: at(0, 0),
            bookings: &[],
            overrides: Some(&overrides),
        };
        // 08:00 UTC is 10:00 in Johannesburg
        assert_eq!(calculator.status_at(at(8, 0)), SlotStatus::Unavailable);
        assert_eq!(calculator.status_at(at(10, 0)), SlotStatus::Available);
    }

    #[test]
    fn test_slots_are_chronological_and_flagged() {
        let starts = candidate_starts(&salon(None), Tz::UTC, june_first());
        let calculator = AvailabilityCalculator {
            duration: Duration::minutes(60),
            tz: Tz::UTC,
            now: at(6, 0),
            bookings: &[],
            overrides: None,
        };
        let slots = calculator.slots(&starts);

        assert_eq!(slots.len(), 24);
        assert!(slots.windows(2).all(|pair| pair[0].time < pair[1].time));
        assert!(slots[..6].iter().all(|slot| !slot.available));
        assert!(slots[6..].iter().all(|slot| slot.available));
    }

    #[test]
    fn test_booking_window_spans_last_slot() {
        let starts = vec![at(9, 0), at(10, 0), at(11, 0)];
        assert_eq!(
            booking_window(&starts, Duration::minutes(45)),
            Some((at(9, 0), at(11, 45)))
        );
        assert_eq!(booking_window(&[], Duration::minutes(45)), None);
    }
}
