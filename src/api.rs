//! Request/response contract of the booking service.
//!
//! Each request names its operation in an `"op"` field; each response carries
//! an HTTP-like status code and a JSON body.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Availability {
        date: NaiveDate,
        duration_minutes: u32,
        student_id: Option<Ulid>,
        instructor_id: Option<Ulid>,
        aircraft_id: Option<Ulid>,
    },
    CreateBooking {
        start: Ms,
        end: Ms,
        student_id: Option<Ulid>,
        instructor_id: Option<Ulid>,
        aircraft_id: Option<Ulid>,
        /// Defaults to `requested` for students and `pending` for staff.
        status: Option<BookingStatus>,
        lesson_template: Option<Ulid>,
        actor: Actor,
    },
    Transition {
        id: Ulid,
        status: BookingStatus,
        actor: Actor,
    },
    /// Omitted fields keep their value; an explicit `null` clears a resource
    /// or the lesson template.
    UpdateBooking {
        id: Ulid,
        start: Option<Ms>,
        end: Option<Ms>,
        #[serde(default, deserialize_with = "present")]
        student_id: Option<Option<Ulid>>,
        #[serde(default, deserialize_with = "present")]
        instructor_id: Option<Option<Ulid>>,
        #[serde(default, deserialize_with = "present")]
        aircraft_id: Option<Option<Ulid>>,
        #[serde(default, deserialize_with = "present")]
        lesson_template: Option<Option<Ulid>>,
        actor: Actor,
    },
    GetBooking {
        id: Ulid,
    },
    Schedule {
        kind: ResourceKind,
        id: Ulid,
        from: Ms,
        to: Ms,
    },
    FreeWindows {
        kind: ResourceKind,
        id: Ulid,
        date: NaiveDate,
    },
}

/// Tells an explicit `null` (`Some(None)`) apart from a missing field (`None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn created(body: Value) -> Self {
        Self { status: 201, body }
    }

    fn error(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": code, "message": message.into() }),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(400, "bad_request", message)
    }
}

impl From<EngineError> for Response {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::Validation(_) => Response::error(400, "validation", message),
            EngineError::NotFound(_) => Response::error(404, "not_found", message),
            EngineError::Conflict { resource, booking } => Response {
                status: 409,
                body: json!({
                    "error": "conflict",
                    "message": message,
                    "resource": resource,
                    "conflicting_booking_id": booking,
                }),
            },
            EngineError::InvalidTransition { .. } => Response::error(409, "invalid_transition", message),
            EngineError::Forbidden(_) => Response::error(403, "forbidden", message),
            EngineError::TooEarly { not_before, .. } => Response {
                status: 409,
                body: json!({ "error": "too_early", "message": message, "not_before": not_before }),
            },
            EngineError::NotEditable(_) => Response::error(409, "not_editable", message),
            EngineError::LimitExceeded(_) => Response::error(400, "limit_exceeded", message),
            EngineError::WalError(_) => Response::error(500, "internal", message),
        }
    }
}

fn span_from(start: Ms, end: Ms) -> Result<Span, EngineError> {
    Span::checked(start, end)
        .ok_or_else(|| EngineError::Validation(format!("start {start} must be before end {end}")))
}

fn booking_body(booking: &Booking) -> Value {
    json!({ "booking": booking })
}

/// Run one request against the engine.
pub async fn handle(engine: &Engine, req: Request) -> Response {
    match dispatch(engine, req).await {
        Ok(resp) => resp,
        Err(e) => e.into(),
    }
}

async fn dispatch(engine: &Engine, req: Request) -> Result<Response, EngineError> {
    match req {
        Request::Availability {
            date,
            duration_minutes,
            student_id,
            instructor_id,
            aircraft_id,
        } => {
            let participants = Participants {
                student: student_id,
                instructor: instructor_id,
                aircraft: aircraft_id,
            };
            if participants.is_empty() {
                return Ok(Response::bad_request(
                    "at least one of student_id, instructor_id, aircraft_id is required",
                ));
            }
            let slots = engine
                .search_availability(date, duration_minutes, &participants)
                .await?;
            let session = Span::new(0, add_minutes(0, i64::from(duration_minutes)));
            let cells = span_slots(&session, engine.settings().granularity_minutes);
            let slots: Vec<Value> = slots.into_iter().map(|t| json!({ "time": t })).collect();
            Ok(Response::ok(json!({ "slots": slots, "cells": cells })))
        }

        Request::CreateBooking {
            start,
            end,
            student_id,
            instructor_id,
            aircraft_id,
            status,
            lesson_template,
            actor,
        } => {
            let status = status.unwrap_or(match actor.role {
                Role::Student => BookingStatus::Requested,
                Role::Instructor | Role::Admin => BookingStatus::Pending,
            });
            let new = NewBooking {
                span: span_from(start, end)?,
                participants: Participants {
                    student: student_id,
                    instructor: instructor_id,
                    aircraft: aircraft_id,
                },
                status,
                lesson_template,
            };
            let booking = engine.create_booking(new, actor).await?;
            Ok(Response::created(booking_body(&booking)))
        }

        Request::Transition { id, status, actor } => {
            let booking = engine.transition(id, status, actor).await?;
            Ok(Response::ok(booking_body(&booking)))
        }

        Request::UpdateBooking {
            id,
            start,
            end,
            student_id,
            instructor_id,
            aircraft_id,
            lesson_template,
            actor,
        } => {
            // Fields left out keep their current value.
            let current = engine.get_booking(&id).ok_or(EngineError::NotFound(id))?;
            let span = match (start, end) {
                (None, None) => None,
                (s, e) => Some(span_from(
                    s.unwrap_or(current.span.start),
                    e.unwrap_or(current.span.end),
                )?),
            };
            let participants = (student_id.is_some() || instructor_id.is_some() || aircraft_id.is_some())
                .then(|| Participants {
                    student: student_id.unwrap_or(current.participants.student),
                    instructor: instructor_id.unwrap_or(current.participants.instructor),
                    aircraft: aircraft_id.unwrap_or(current.participants.aircraft),
                });
            let patch = BookingPatch {
                span,
                participants,
                lesson_template,
            };
            let booking = engine.update_booking(id, patch, actor).await?;
            Ok(Response::ok(booking_body(&booking)))
        }

        Request::GetBooking { id } => {
            let booking = engine.get_booking(&id).ok_or(EngineError::NotFound(id))?;
            Ok(Response::ok(booking_body(&booking)))
        }

        Request::Schedule { kind, id, from, to } => {
            let window = span_from(from, to)?;
            let bookings = engine.resource_schedule(&ResourceRef { kind, id }, &window)?;
            Ok(Response::ok(json!({ "bookings": bookings })))
        }

        Request::FreeWindows { kind, id, date } => {
            let windows = engine.free_windows(&ResourceRef { kind, id }, date).await?;
            Ok(Response::ok(json!({ "windows": windows })))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::engine::ScheduleSettings;

    const H: Ms = 3_600_000;
    /// 2025-06-01T00:00:00Z
    const DAY: Ms = 1_748_736_000_000;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("skyslot_test_api");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn parse(line: &str) -> Request {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn parses_requests_by_op() {
        let id = Ulid::new();
        let req = parse(&format!(
            r#"{{"op":"availability","date":"2025-06-01","duration_minutes":60,"instructor_id":"{id}"}}"#
        ));
        assert_eq!(
            req,
            Request::Availability {
                date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                duration_minutes: 60,
                student_id: None,
                instructor_id: Some(id),
                aircraft_id: None,
            }
        );

        let req = parse(&format!(
            r#"{{"op":"transition","id":"{id}","status":"cancelled","actor":{{"role":"admin"}}}}"#
        ));
        assert_eq!(
            req,
            Request::Transition {
                id,
                status: BookingStatus::Cancelled,
                actor: Actor::admin(),
            }
        );
    }

    #[test]
    fn unknown_op_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"op":"drop_tables"}"#).is_err());
    }

    #[test]
    fn error_status_mapping() {
        let id = Ulid::new();
        let cases: [(EngineError, u16, &str); 9] = [
            (EngineError::Validation("x".into()), 400, "validation"),
            (EngineError::NotFound(id), 404, "not_found"),
            (
                EngineError::Conflict { resource: ResourceRef::aircraft(id), booking: id },
                409,
                "conflict",
            ),
            (
                EngineError::InvalidTransition { from: BookingStatus::Completed, to: BookingStatus::Pending },
                409,
                "invalid_transition",
            ),
            (EngineError::Forbidden("no"), 403, "forbidden"),
            (EngineError::TooEarly { to: BookingStatus::Ongoing, not_before: 5 }, 409, "too_early"),
            (EngineError::NotEditable(BookingStatus::Ongoing), 409, "not_editable"),
            (EngineError::LimitExceeded("big"), 400, "limit_exceeded"),
            (EngineError::WalError("disk".into()), 500, "internal"),
        ];
        for (err, status, code) in cases {
            let resp = Response::from(err);
            assert_eq!(resp.status, status);
            assert_eq!(resp.body["error"], code);
        }
    }

    #[test]
    fn conflict_body_names_resource_and_booking() {
        let (r, b) = (Ulid::new(), Ulid::new());
        let resp = Response::from(EngineError::Conflict { resource: ResourceRef::instructor(r), booking: b });
        assert_eq!(resp.body["resource"]["kind"], "instructor");
        assert_eq!(resp.body["resource"]["id"], r.to_string());
        assert_eq!(resp.body["conflicting_booking_id"], b.to_string());
    }

    #[tokio::test]
    async fn availability_requires_a_resource() {
        let engine = Engine::new(test_wal_path("availability_empty.wal"), ScheduleSettings::default()).unwrap();
        let req = parse(r#"{"op":"availability","date":"2025-06-01","duration_minutes":60}"#);
        let resp = handle(&engine, req).await;
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["error"], "bad_request");
    }

    #[tokio::test]
    async fn create_then_conflict_then_search() {
        let engine = Engine::new(test_wal_path("create_conflict.wal"), ScheduleSettings::default()).unwrap();
        let (s, i) = (Ulid::new(), Ulid::new());

        let create = |start: Ms| {
            parse(&format!(
                r#"{{"op":"create_booking","start":{start},"end":{},"student_id":"{s}","instructor_id":"{i}","actor":{{"role":"instructor","id":"{i}"}}}}"#,
                start + H
            ))
        };

        let resp = handle(&engine, create(DAY + 9 * H)).await;
        assert_eq!(resp.status, 201);
        assert_eq!(resp.body["booking"]["status"], "pending");
        let first = resp.body["booking"]["id"].as_str().unwrap().to_string();

        let resp = handle(&engine, create(DAY + 9 * H)).await;
        assert_eq!(resp.status, 409);
        assert_eq!(resp.body["resource"]["kind"], "student");
        assert_eq!(resp.body["conflicting_booking_id"], first);

        let req = parse(&format!(
            r#"{{"op":"availability","date":"2025-06-01","duration_minutes":90,"instructor_id":"{i}"}}"#
        ));
        let resp = handle(&engine, req).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["cells"], 2);
        let times: Vec<i64> = resp.body["slots"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["time"].as_i64().unwrap())
            .collect();
        assert!(!times.contains(&(DAY + 8 * H)));
        assert!(!times.contains(&(DAY + 9 * H)));
        assert!(times.contains(&(DAY + 10 * H)));
    }

    #[tokio::test]
    async fn student_create_defaults_to_request() {
        let engine = Engine::new(test_wal_path("student_default.wal"), ScheduleSettings::default()).unwrap();
        let s = Ulid::new();
        let req = parse(&format!(
            r#"{{"op":"create_booking","start":{},"end":{},"student_id":"{s}","actor":{{"role":"student","id":"{s}"}}}}"#,
            DAY + 9 * H,
            DAY + 10 * H
        ));
        let resp = handle(&engine, req).await;
        assert_eq!(resp.status, 201);
        assert_eq!(resp.body["booking"]["status"], "requested");
    }

    #[tokio::test]
    async fn update_keeps_unspecified_fields() {
        let engine = Engine::new(test_wal_path("update_partial.wal"), ScheduleSettings::default()).unwrap();
        let (s, i, a) = (Ulid::new(), Ulid::new(), Ulid::new());
        let booking = engine
            .create_booking(
                NewBooking {
                    span: Span::new(DAY + 9 * H, DAY + 10 * H),
                    participants: Participants { student: Some(s), instructor: Some(i), aircraft: None },
                    status: BookingStatus::Pending,
                    lesson_template: None,
                },
                Actor::admin(),
            )
            .await
            .unwrap();

        let req = parse(&format!(
            r#"{{"op":"update_booking","id":"{}","end":{},"aircraft_id":"{a}","actor":{{"role":"admin"}}}}"#,
            booking.id,
            DAY + 11 * H
        ));
        let resp = handle(&engine, req).await;
        assert_eq!(resp.status, 200);

        let updated = engine.get_booking(&booking.id).unwrap();
        assert_eq!(updated.span, Span::new(DAY + 9 * H, DAY + 11 * H));
        assert_eq!(updated.participants, Participants { student: Some(s), instructor: Some(i), aircraft: Some(a) });
    }

    #[tokio::test]
    async fn update_null_clears_aircraft_and_template() {
        let engine = Engine::new(test_wal_path("update_clear.wal"), ScheduleSettings::default()).unwrap();
        let (s, i, a, t) = (Ulid::new(), Ulid::new(), Ulid::new(), Ulid::new());
        let booking = engine
            .create_booking(
                NewBooking {
                    span: Span::new(DAY + 9 * H, DAY + 10 * H),
                    participants: Participants { student: Some(s), instructor: Some(i), aircraft: Some(a) },
                    status: BookingStatus::Pending,
                    lesson_template: Some(t),
                },
                Actor::admin(),
            )
            .await
            .unwrap();

        let req = parse(&format!(
            r#"{{"op":"update_booking","id":"{}","aircraft_id":null,"lesson_template":null,"actor":{{"role":"admin"}}}}"#,
            booking.id
        ));
        assert_eq!(handle(&engine, req).await.status, 200);

        let updated = engine.get_booking(&booking.id).unwrap();
        assert_eq!(updated.participants, Participants { student: Some(s), instructor: Some(i), aircraft: None });
        assert_eq!(updated.lesson_template, None);
        assert!(engine.calendar_snapshot(&ResourceRef::aircraft(a)).await.unwrap().is_empty());
    }

    #[test]
    fn update_distinguishes_null_from_missing() {
        let id = Ulid::new();
        let req = parse(&format!(
            r#"{{"op":"update_booking","id":"{id}","aircraft_id":null,"actor":{{"role":"admin"}}}}"#
        ));
        match req {
            Request::UpdateBooking { aircraft_id, instructor_id, lesson_template, .. } => {
                assert_eq!(aircraft_id, Some(None));
                assert_eq!(instructor_id, None);
                assert_eq!(lesson_template, None);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[tokio::test]
    async fn schedule_with_extreme_bounds_is_rejected() {
        let engine = Engine::new(test_wal_path("schedule_extreme.wal"), ScheduleSettings::default()).unwrap();
        let req = Request::Schedule {
            kind: ResourceKind::Aircraft,
            id: Ulid::new(),
            from: i64::MIN,
            to: i64::MAX,
        };
        let resp = handle(&engine, req).await;
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["error"], "limit_exceeded");
    }

    #[tokio::test]
    async fn inverted_span_is_a_validation_error() {
        let engine = Engine::new(test_wal_path("inverted.wal"), ScheduleSettings::default()).unwrap();
        let req = parse(&format!(
            r#"{{"op":"create_booking","start":{},"end":{},"instructor_id":"{}","actor":{{"role":"admin"}}}}"#,
            DAY + 10 * H,
            DAY + 9 * H,
            Ulid::new()
        ));
        let resp = handle(&engine, req).await;
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["error"], "validation");
    }

    #[tokio::test]
    async fn missing_booking_is_404() {
        let engine = Engine::new(test_wal_path("missing.wal"), ScheduleSettings::default()).unwrap();
        let resp = handle(&engine, Request::GetBooking { id: Ulid::new() }).await;
        assert_eq!(resp.status, 404);
    }
}
