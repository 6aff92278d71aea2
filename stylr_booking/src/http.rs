use crate::backend::BookingBackend;
use crate::booking_manager::BookingManager;
use crate::chat::Message;
use crate::configuration::Configuration;
use crate::error::{BookingError, BookingResult};
use crate::events::EventRelay;
use crate::extract::{ApiPath, ValidJson, ValidQuery};
use crate::requests::{
    CreateBookingRequest, CreateSalonRequest, CreateServiceRequest, DateQuery, DayQuery, MonthQuery,
    SendMessageRequest, UpdateAvailabilityRequest, UpdateSalonRequest, UpdateServiceRequest,
};
use crate::types::{Booking, Caller, DailyAvailability, HourAvailability, Salon, Service, Slot};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Response;
use axum::routing::{get, patch, post, put};
use axum::{Extension, Json, Router};
use chrono::NaiveDate;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

pub const USER_HEADER: &str = "x-user-id";
pub const ADMIN_HEADER: &str = "x-admin-password";

#[derive(Clone)]
pub struct AppState<T: BookingBackend> {
    manager: BookingManager<T>,
    relay: EventRelay,
    admin_password: String,
}

pub fn create_app<T: BookingBackend>(
    manager: BookingManager<T>,
    configuration: impl Configuration,
) -> Router {
    let state = AppState {
        relay: manager.relay().clone(),
        manager,
        admin_password: configuration.admin_password(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route(
            "/api/bookings/availability/{service_id}",
            get(service_availability),
        )
        .route("/api/availability/{salon_id}", get(daily_availability))
        .route(
            "/api/availability/{salon_id}/month",
            get(monthly_availability),
        )
        .route("/api/salons/{id}", get(get_salon))
        .route("/api/services/{id}", get(get_service));

    let protected = Router::new()
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/my", get(my_bookings))
        .route("/api/bookings/{id}", get(get_booking))
        .route("/api/bookings/{id}/confirm", patch(confirm_booking))
        .route("/api/bookings/{id}/cancel", patch(cancel_booking))
        .route("/api/bookings/{id}/complete", patch(complete_booking))
        .route(
            "/api/availability/{salon_id}",
            put(update_daily_availability),
        )
        .route("/api/salons", post(create_salon))
        .route("/api/salons/{id}", patch(update_salon))
        .route("/api/salons/{id}/bookings", get(salon_bookings))
        .route("/api/salons/{id}/services", post(create_service))
        .route("/api/services/{id}", patch(update_service))
        .route("/api/chat/messages", post(send_message))
        .route("/api/chat/conversations/{user_id}", get(conversation))
        .route("/api/chat/messages/{id}/delivered", patch(mark_delivered))
        .route("/api/chat/messages/{id}/read", patch(mark_read))
        .route("/api/events", get(events))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            authenticate::<T>,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Resolves the caller from the gateway headers. A wrong admin password or a
/// malformed user id is rejected rather than downgraded.
fn identify(headers: &HeaderMap, admin_password: &str) -> BookingResult<Caller> {
    let admin = match headers.get(ADMIN_HEADER) {
        Some(value) if value.to_str().ok() == Some(admin_password) => true,
        Some(_) => return Err(BookingError::Unauthorized),
        None => false,
    };
    let user_id = match headers.get(USER_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .ok()
                .and_then(|value| Uuid::parse_str(value.trim()).ok())
                .ok_or(BookingError::Unauthorized)?,
        ),
        None => None,
    };

    if user_id.is_none() && !admin {
        return Err(BookingError::Unauthorized);
    }
    Ok(Caller { user_id, admin })
}

async fn authenticate<T: BookingBackend>(
    State(state): State<AppState<T>>,
    mut request: Request,
    next: Next,
) -> Result<Response, BookingError> {
    let caller = identify(request.headers(), &state.admin_password)?;
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

#[derive(Debug, Serialize, Deserialize)]
struct SlotsResponse {
    slots: Vec<Slot>,
}

async fn service_availability<T: BookingBackend>(
    State(state): State<AppState<T>>,
    ApiPath(service_id): ApiPath<Uuid>,
    ValidQuery(query): ValidQuery<DateQuery>,
) -> BookingResult<Json<SlotsResponse>> {
    let slots = state.manager.availability(service_id, query.date)?;
    Ok(Json(SlotsResponse { slots }))
}

async fn create_booking<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ValidJson(request): ValidJson<CreateBookingRequest>,
) -> BookingResult<(StatusCode, Json<Booking>)> {
    let booking = state.manager.create_booking(&caller, request)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn my_bookings<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
) -> BookingResult<Json<Vec<Booking>>> {
    state.manager.my_bookings(&caller).map(Json)
}

async fn get_booking<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
) -> BookingResult<Json<Booking>> {
    state.manager.booking(&caller, id).map(Json)
}

async fn confirm_booking<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
) -> BookingResult<Json<Booking>> {
    state.manager.confirm_booking(&caller, id).map(Json)
}

async fn cancel_booking<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
) -> BookingResult<Json<Booking>> {
    state.manager.cancel_booking(&caller, id).map(Json)
}

async fn complete_booking<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
) -> BookingResult<Json<Booking>> {
    state.manager.complete_booking(&caller, id).map(Json)
}

async fn daily_availability<T: BookingBackend>(
    State(state): State<AppState<T>>,
    ApiPath(salon_id): ApiPath<Uuid>,
    ValidQuery(query): ValidQuery<DayQuery>,
) -> BookingResult<Json<DailyAvailability>> {
    let date = match query.date {
        Some(date) => date,
        None => state.manager.salon_today(salon_id)?,
    };
    state.manager.daily_availability(salon_id, date).map(Json)
}

async fn monthly_availability<T: BookingBackend>(
    State(state): State<AppState<T>>,
    ApiPath(salon_id): ApiPath<Uuid>,
    ValidQuery(query): ValidQuery<MonthQuery>,
) -> BookingResult<Json<BTreeMap<NaiveDate, Vec<HourAvailability>>>> {
    state
        .manager
        .monthly_availability(salon_id, query.year, query.month)
        .map(Json)
}

async fn update_daily_availability<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(salon_id): ApiPath<Uuid>,
    ValidJson(request): ValidJson<UpdateAvailabilityRequest>,
) -> BookingResult<Json<DailyAvailability>> {
    state
        .manager
        .update_daily_availability(&caller, salon_id, request)
        .map(Json)
}

async fn get_salon<T: BookingBackend>(
    State(state): State<AppState<T>>,
    ApiPath(id): ApiPath<Uuid>,
) -> BookingResult<Json<Salon>> {
    state.manager.salon(id).map(Json)
}

async fn create_salon<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ValidJson(request): ValidJson<CreateSalonRequest>,
) -> BookingResult<(StatusCode, Json<Salon>)> {
    let salon = state.manager.create_salon(&caller, request)?;
    Ok((StatusCode::CREATED, Json(salon)))
}

async fn update_salon<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(request): ValidJson<UpdateSalonRequest>,
) -> BookingResult<Json<Salon>> {
    state.manager.update_salon(&caller, id, request).map(Json)
}

async fn salon_bookings<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
) -> BookingResult<Json<Vec<Booking>>> {
    state.manager.salon_bookings(&caller, id).map(Json)
}

async fn get_service<T: BookingBackend>(
    State(state): State<AppState<T>>,
    ApiPath(id): ApiPath<Uuid>,
) -> BookingResult<Json<Service>> {
    state.manager.service(id).map(Json)
}

async fn create_service<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(salon_id): ApiPath<Uuid>,
    ValidJson(request): ValidJson<CreateServiceRequest>,
) -> BookingResult<(StatusCode, Json<Service>)> {
    let service = state.manager.create_service(&caller, salon_id, request)?;
    Ok((StatusCode::CREATED, Json(service)))
}

async fn update_service<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(request): ValidJson<UpdateServiceRequest>,
) -> BookingResult<Json<Service>> {
    state.manager.update_service(&caller, id, request).map(Json)
}

async fn send_message<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ValidJson(request): ValidJson<SendMessageRequest>,
) -> BookingResult<(StatusCode, Json<Message>)> {
    let message = state.manager.send_message(&caller, request)?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn conversation<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> BookingResult<Json<Vec<Message>>> {
    state.manager.conversation(&caller, user_id).map(Json)
}

async fn mark_delivered<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
) -> BookingResult<Json<Message>> {
    state.manager.mark_delivered(&caller, id).map(Json)
}

async fn mark_read<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<Uuid>,
) -> BookingResult<Json<Message>> {
    state.manager.mark_read(&caller, id).map(Json)
}

/// Server-sent events addressed to the caller. Admins receive everything.
async fn events<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(caller): Extension<Caller>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.relay.stream().filter_map(move |received| async move {
        match received {
            Ok(event) if caller.admin || caller.user_id.is_some_and(|id| event.is_for(id)) => {
                Event::default()
                    .event(event.kind.name())
                    .json_data(&event)
                    .ok()
                    .map(Ok)
            }
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "Event subscriber lagged behind");
                None
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
