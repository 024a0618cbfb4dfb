use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ulid::Ulid;

use crate::engine::{calendar, Engine};
use crate::model::*;

use super::caller::Caller;
use super::error::{ApiError, ApiResult};

type AppState = State<Arc<Engine>>;

// ── Wire shapes ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentBody {
    professional_profile_id: String,
    start_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleBody {
    day_of_week: u8,
    start_time: String,
    end_time: String,
}

/// `POST /availability` takes one rule or a whole weekly set.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AvailabilityPayload {
    Many(Vec<RuleBody>),
    Single(RuleBody),
}

#[derive(Debug, Deserialize)]
pub struct RuleIdQuery {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBody {
    appointment_duration_minutes: Option<u32>,
    timezone: Option<String>,
    #[serde(default)]
    auto_confirm_appointments: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    appointment_duration_minutes: Option<u32>,
    timezone: Option<String>,
    auto_confirm_appointments: bool,
}

#[derive(Debug, Serialize)]
pub struct RuleView {
    id: Ulid,
    professional_id: Ulid,
    day_of_week: u8,
    start_time: String,
    end_time: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RulesCreated {
    One(RuleView),
    Many(Vec<RuleView>),
}

impl From<&AvailabilityRule> for RuleView {
    fn from(rule: &AvailabilityRule) -> Self {
        Self {
            id: rule.id,
            professional_id: rule.professional_id,
            day_of_week: rule.day_of_week.number(),
            start_time: rule.start_time.format("%H:%M").to_string(),
            end_time: rule.end_time.format("%H:%M").to_string(),
        }
    }
}

impl From<ScheduleConfig> for ScheduleView {
    fn from(config: ScheduleConfig) -> Self {
        Self {
            appointment_duration_minutes: config.appointment_duration_minutes,
            timezone: config.timezone,
            auto_confirm_appointments: config.auto_confirm_appointments,
        }
    }
}

// ── Parsing helpers ──────────────────────────────────────

fn parse_id(raw: &str, what: &str) -> ApiResult<Ulid> {
    Ulid::from_string(raw.trim()).map_err(|_| ApiError::Validation(format!("malformed {what}: {raw}")))
}

fn parse_instant(raw: &str) -> ApiResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ApiError::Validation(format!("startTime must be an ISO-8601 instant: {raw}")))
}

/// Millisecond precision with a `Z` suffix, e.g. `2030-01-07T12:00:00.000Z`.
fn render_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl RuleBody {
    fn window(&self) -> ApiResult<RuleWindow> {
        let day_of_week = DayOfWeek::new(self.day_of_week).ok_or_else(|| {
            ApiError::Validation(format!("dayOfWeek must be 0-6, got {}", self.day_of_week))
        })?;
        let time = |raw: &str| {
            calendar::parse_wall_clock(raw)
                .ok_or_else(|| ApiError::Validation(format!("time must be HH:mm, got {raw:?}")))
        };
        Ok(RuleWindow {
            day_of_week,
            start_time: time(&self.start_time)?,
            end_time: time(&self.end_time)?,
        })
    }
}

// ── Handlers ─────────────────────────────────────────────

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn available_slots(
    State(engine): AppState,
    Path(professional_id): Path<String>,
    query: Result<Query<SlotQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<String>>> {
    let professional_id = parse_id(&professional_id, "professional id")?;
    let Query(query) = query?;
    let raw = query
        .date
        .ok_or_else(|| ApiError::Validation("date query parameter is required".into()))?;
    let date = calendar::parse_date(&raw)
        .ok_or_else(|| ApiError::Validation(format!("date must be YYYY-MM-DD, got {raw:?}")))?;

    let slots = engine.available_slots(professional_id, date).await?;
    Ok(Json(slots.into_iter().map(render_instant).collect()))
}

pub async fn get_schedule(
    State(engine): AppState,
    Path(professional_id): Path<String>,
) -> ApiResult<Json<ScheduleView>> {
    let professional_id = parse_id(&professional_id, "professional id")?;
    let config = engine.schedule(professional_id).await?;
    Ok(Json(config.into()))
}

pub async fn put_schedule(
    State(engine): AppState,
    caller: Caller,
    Path(professional_id): Path<String>,
    body: Result<Json<ScheduleBody>, JsonRejection>,
) -> ApiResult<Json<ScheduleView>> {
    let professional_id = parse_id(&professional_id, "professional id")?;
    if caller.require_professional()? != professional_id {
        return Err(ApiError::Forbidden(
            "a professional may only configure their own schedule".into(),
        ));
    }
    let Json(body) = body?;

    let config = ScheduleConfig {
        appointment_duration_minutes: body.appointment_duration_minutes,
        timezone: body.timezone,
        auto_confirm_appointments: body.auto_confirm_appointments,
    };
    engine
        .configure_professional(professional_id, config.clone())
        .await?;
    Ok(Json(config.into()))
}

pub async fn create_appointment(
    State(engine): AppState,
    caller: Caller,
    body: Result<Json<CreateAppointmentBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    let Json(body) = body?;
    let professional_id = parse_id(&body.professional_profile_id, "professionalProfileId")?;
    let start = parse_instant(&body.start_time)?;

    let appointment = engine
        .create_appointment(caller.id, professional_id, start)
        .await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn list_appointments(State(engine): AppState, caller: Caller) -> Json<Vec<Appointment>> {
    Json(engine.list_appointments(caller.id).await)
}

pub async fn get_appointment(
    State(engine): AppState,
    caller: Caller,
    Path(appointment_id): Path<String>,
) -> ApiResult<Json<Appointment>> {
    let appointment_id = parse_id(&appointment_id, "appointment id")?;
    Ok(Json(engine.get_appointment(appointment_id, caller.id).await?))
}

pub async fn cancel_appointment(
    State(engine): AppState,
    caller: Caller,
    Path(appointment_id): Path<String>,
) -> ApiResult<StatusCode> {
    let appointment_id = parse_id(&appointment_id, "appointment id")?;
    engine.cancel_appointment(appointment_id, caller.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_availability(
    State(engine): AppState,
    caller: Caller,
    body: Result<Json<AvailabilityPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RulesCreated>)> {
    let professional_id = caller.require_professional()?;
    let Json(payload) = body?;

    let created = match payload {
        AvailabilityPayload::Single(rule) => {
            let rule = engine
                .add_availability(professional_id, rule.window()?)
                .await?;
            RulesCreated::One((&rule).into())
        }
        AvailabilityPayload::Many(rules) => {
            let windows = rules
                .iter()
                .map(RuleBody::window)
                .collect::<ApiResult<Vec<_>>>()?;
            let rules = engine
                .replace_availability(professional_id, &windows)
                .await?;
            RulesCreated::Many(rules.iter().map(RuleView::from).collect())
        }
    };
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_availability(
    State(engine): AppState,
    caller: Caller,
) -> ApiResult<Json<Vec<RuleView>>> {
    let professional_id = caller.require_professional()?;
    let rules = engine.list_availability(professional_id).await;
    Ok(Json(rules.iter().map(RuleView::from).collect()))
}

pub async fn delete_availability(
    State(engine): AppState,
    caller: Caller,
    query: Result<Query<RuleIdQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let professional_id = caller.require_professional()?;
    let Query(query) = query?;
    let raw = query
        .id
        .ok_or_else(|| ApiError::Validation("id query parameter is required".into()))?;
    let rule_id = parse_id(&raw, "rule id")?;

    engine.remove_availability(rule_id, professional_id).await?;
    Ok(Json(json!({ "id": rule_id, "deleted": true })))
}
