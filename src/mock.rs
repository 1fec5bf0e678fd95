//! Scripted in-memory transport for testing.
//!
//! [`MockTransport`] implements [`Transport`] without any network access. Responses
//! are queued per operation name and consumed in order; once a queue is empty the
//! operation falls back to its default response, if one was set. Every request is
//! recorded so tests can assert on exactly which remote calls were made.
//!
//! The document builders at the bottom produce realistic payloads for the
//! operations the client issues.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::operations::Operation;
use crate::transport::Transport;

/// One request seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operation: String,
    pub variables: Value,
    pub bearer: Option<String>,
}

#[derive(Default)]
pub struct MockTransport {
    scripted: Mutex<HashMap<String, VecDeque<Result<Value>>>>,
    defaults: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful `data` payload for the next call to `operation`.
    pub fn push_ok(&self, operation: &str, data: Value) {
        self.push(operation, Ok(data));
    }

    /// Queue a failure for the next call to `operation`.
    pub fn push_err(&self, operation: &str, err: Error) {
        self.push(operation, Err(err));
    }

    fn push(&self, operation: &str, result: Result<Value>) {
        lock(&self.scripted)
            .entry(operation.to_string())
            .or_default()
            .push_back(result);
    }

    /// Response used whenever nothing is queued for `operation`.
    pub fn set_default(&self, operation: &str, data: Value) {
        lock(&self.defaults).insert(operation.to_string(), data);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn operations(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .map(|call| call.operation.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn count(&self, operation: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, operation: &Operation, bearer: Option<&str>) -> Result<Value> {
        lock(&self.calls).push(RecordedCall {
            operation: operation.name.to_string(),
            variables: operation.variables.clone(),
            bearer: bearer.map(str::to_string),
        });

        let scripted = lock(&self.scripted)
            .get_mut(operation.name)
            .and_then(VecDeque::pop_front);
        if let Some(result) = scripted {
            return result;
        }

        lock(&self.defaults)
            .get(operation.name)
            .cloned()
            .ok_or_else(|| Error::Api(format!("No mock response for {}", operation.name)))
    }
}

pub fn sign_in_success(access_token: &str, refresh_token: &str, ttl: i64) -> Value {
    json!({
        "signIn": {
            "__typename": "SignInSuccess",
            "accessToken": access_token,
            "refreshToken": refresh_token,
            "ttl": ttl,
            "user": { "temperatureUnit": "F" }
        }
    })
}

pub fn refresh_success(access_token: &str, refresh_token: &str, ttl: i64) -> Value {
    json!({
        "refreshToken": {
            "__typename": "RefreshTokenSuccess",
            "accessToken": access_token,
            "refreshToken": refresh_token,
            "ttl": ttl
        }
    })
}

pub fn me_response(unit: &str) -> Value {
    json!({ "me": { "temperatureUnit": unit } })
}

pub fn mutation_success(name: &str) -> Value {
    let mut typename = name.to_string();
    if let Some(first) = typename.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    json!({ name: { "__typename": format!("{}Success", typename) } })
}

pub fn mutation_rejected(name: &str, variant: &str, message: &str) -> Value {
    json!({ name: { "__typename": variant, "message": message } })
}

fn schedule_event(slot: &str, heat: f64, cool: f64) -> Value {
    json!({
        "day": "MONDAY",
        "fanMode": "AUTO",
        "setpoints": { "heat": heat, "cool": cool },
        "slot": slot,
        "start": { "day": "MONDAY", "hour": 6, "minute": 0 },
        "stop": { "day": "MONDAY", "hour": 8, "minute": 0 }
    })
}

/// A full device-state document for an online thermostat heating to 68°F.
pub fn controller_document(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "activeDemand": "HEAT",
        "activeScheduleEvent": schedule_event("AWAKE", 68.0, 76.0),
        "airflow": null,
        "airflowTestActive": false,
        "away": { "active": false, "setpoints": { "heat": 62.0, "cool": 82.0 } },
        "coolRange": { "min": 60.0, "max": 92.0 },
        "deadband": 3.0,
        "dehumidification": { "min": 40.0, "max": 60.0, "mode": "OFF", "value": 50.0 },
        "disabled": false,
        "fan": {
            "active": false,
            "cfm": null,
            "mode": "AUTO",
            "modes": ["AUTO", "FIFTEEN", "ALWAYS"],
            "override": null
        },
        "heatRange": { "min": 50.0, "max": 90.0 },
        "humidification": { "min": 10.0, "max": 45.0, "mode": "AUTO", "value": 35.0 },
        "humidity": 41.0,
        "indoorTemp": 67.5,
        "location": { "connectionStatus": "ONLINE" },
        "mode": "HEAT",
        "modes": ["OFF", "AUTO", "HEAT", "COOL", "EHEAT"],
        "outdoorTemp": 44.0,
        "schedule": {
            "day": "MONDAY",
            "awake": schedule_event("AWAKE", 68.0, 76.0),
            "leave": schedule_event("LEAVE", 62.0, 82.0),
            "arrive": schedule_event("ARRIVE", 68.0, 76.0),
            "bed": schedule_event("BED", 64.0, 78.0),
            "events": []
        },
        "scheduleOverride": "CANCELLED",
        "setpoints": { "heat": 68.0, "cool": 76.0 },
        "tempOverride": null,
        "zone": null,
        "zoneSensor": null,
        "zoning": false,
        "humidityNotification": { "enabled": false, "min": 20, "max": 60 },
        "temperatureNotification": { "enabled": false, "min": 50, "max": 90 },
        "accessLevel": "OWNER"
    })
}

pub fn controller_response(document: Value) -> Value {
    json!({ "controller": document })
}

pub fn location_document(id: &str, name: &str, controllers: Vec<Value>) -> Value {
    json!({
        "id": id,
        "name": name,
        "brand": "Johnson Controls",
        "model": "Hx 3",
        "lat": 43.07,
        "lng": -89.40,
        "version": { "application": "3.2.1", "bootloader": "1.0.4", "outdoorControl": null },
        "controllers": controllers
    })
}

pub fn locations_response(locations: Vec<Value>) -> Value {
    json!({ "locations": locations })
}
