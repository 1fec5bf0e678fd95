//! GraphQL documents and the typed operations built from them.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

use crate::types::{FanMode, Mode, SetpointKind};

const SCHEDULE_EVENT_FIELDS: &str =
    "day fanMode setpoints { heat cool } slot start { day hour minute } stop { day hour minute }";

/// Selection set of the device-state document, shared by discovery and refresh.
pub fn controller_fields() -> String {
    format!(
        "{{ id activeDemand activeScheduleEvent {{ {ev} }} airflow airflowTestActive \
away {{ active setpoints {{ heat cool }} }} coolRange {{ min max }} deadband \
dehumidification {{ max min mode value }} disabled fan {{ active cfm mode modes override }} \
heatRange {{ min max }} humidification {{ max min mode value }} humidity indoorTemp \
location {{ connectionStatus }} mode modes name outdoorTemp \
schedule {{ day awake {{ {ev} }} leave {{ {ev} }} arrive {{ {ev} }} bed {{ {ev} }} events {{ {ev} }} }} \
scheduleOverride setpoints {{ heat cool }} tempOverride zone zoneSensor {{ sensor version }} zoning \
humidityNotification {{ enabled min max }} temperatureNotification {{ enabled min max }} accessLevel }}",
        ev = SCHEDULE_EVENT_FIELDS
    )
}

/// A named query or mutation together with its variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: &'static str,
    pub document: String,
    pub variables: Value,
}

/// JSON body posted to the GraphQL endpoint.
#[derive(Debug, Serialize)]
pub struct GraphqlRequest<'a> {
    pub query: &'a str,
    #[serde(rename = "operationName")]
    pub operation_name: &'a str,
    pub variables: &'a Value,
}

impl Operation {
    pub fn request(&self) -> GraphqlRequest<'_> {
        GraphqlRequest {
            query: &self.document,
            operation_name: self.name,
            variables: &self.variables,
        }
    }

    pub fn sign_in(email: &str, token: &str) -> Self {
        Self {
            name: "signIn",
            document: "mutation signIn($input: SignInInput!) { signIn(input: $input) { __typename \
... on SignInSuccess { accessToken refreshToken ttl user { temperatureUnit } } \
... on TokenInvalid { message } ... on EmailInvalid { message } } }"
                .to_string(),
            variables: json!({ "input": { "email": email, "token": token } }),
        }
    }

    pub fn refresh_token(refresh_token: &str) -> Self {
        Self {
            name: "refreshToken",
            document: "mutation refreshToken($input: RefreshTokenInput!) { refreshToken(input: $input) { \
__typename ... on RefreshTokenSuccess { accessToken refreshToken ttl } ... on TokenInvalid { message } } }"
                .to_string(),
            variables: json!({ "input": { "token": refresh_token } }),
        }
    }

    pub fn me() -> Self {
        Self {
            name: "me",
            document: "query me { me { temperatureUnit } }".to_string(),
            variables: json!({}),
        }
    }

    pub fn locations() -> Self {
        Self {
            name: "locations",
            document: format!(
                "query locations {{ locations {{ id brand lat lng model name controllers {} \
version {{ application bootloader outdoorControl }} }} }}",
                controller_fields()
            ),
            variables: json!({}),
        }
    }

    pub fn controller(id: &str) -> Self {
        Self {
            name: "controller",
            document: format!(
                "query controller($id: ID!) {{ controller(id: $id) {} }}",
                controller_fields()
            ),
            variables: json!({ "id": id }),
        }
    }
}

/// Typed error variants a mutation can resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteErrorKind {
    NotFound,
    NotSupported,
    AwayModeActive,
    VacationModeActive,
    TokenInvalid,
    EmailInvalid,
    Other(String),
}

impl RemoteErrorKind {
    pub fn from_typename(typename: &str) -> Self {
        match typename {
            "NotFound" => RemoteErrorKind::NotFound,
            "NotSupported" => RemoteErrorKind::NotSupported,
            "AwayModeActive" => RemoteErrorKind::AwayModeActive,
            "VacationModeActive" => RemoteErrorKind::VacationModeActive,
            "TokenInvalid" => RemoteErrorKind::TokenInvalid,
            "EmailInvalid" => RemoteErrorKind::EmailInvalid,
            other => RemoteErrorKind::Other(other.to_string()),
        }
    }

    pub fn typename(&self) -> &str {
        match self {
            RemoteErrorKind::NotFound => "NotFound",
            RemoteErrorKind::NotSupported => "NotSupported",
            RemoteErrorKind::AwayModeActive => "AwayModeActive",
            RemoteErrorKind::VacationModeActive => "VacationModeActive",
            RemoteErrorKind::TokenInvalid => "TokenInvalid",
            RemoteErrorKind::EmailInvalid => "EmailInvalid",
            RemoteErrorKind::Other(name) => name,
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.typename())
    }
}

/// If a union payload resolved to one of its error variants, returns the kind and message.
pub fn payload_error(payload: &Value) -> Option<(RemoteErrorKind, String)> {
    let message = payload.get("message")?.as_str().unwrap_or_default().to_string();
    let kind = payload
        .get("__typename")
        .and_then(Value::as_str)
        .map(RemoteErrorKind::from_typename)
        .unwrap_or_else(|| RemoteErrorKind::Other("Error".to_string()));
    Some((kind, message))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    ChangeAway {
        id: String,
        active: bool,
    },
    ChangeFanMode {
        id: String,
        mode: FanMode,
    },
    ChangeMode {
        id: String,
        mode: Mode,
    },
    ChangeSetpoint {
        id: String,
        setpoint: SetpointKind,
        value: f64,
    },
    ChangeHumidification {
        id: String,
        value: f64,
    },
    ChangeDehumidification {
        id: String,
        value: f64,
    },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::ChangeAway { .. } => "changeAway",
            Mutation::ChangeFanMode { .. } => "changeFanMode",
            Mutation::ChangeMode { .. } => "changeMode",
            Mutation::ChangeSetpoint { .. } => "changeSetpoint",
            Mutation::ChangeHumidification { .. } => "changeHumidification",
            Mutation::ChangeDehumidification { .. } => "changeDehumidification",
        }
    }

    fn input_type(&self) -> &'static str {
        match self {
            Mutation::ChangeAway { .. } => "ChangeAwayInput!",
            Mutation::ChangeFanMode { .. } => "ChangeFanModeInput!",
            Mutation::ChangeMode { .. } => "ChangeModeInput!",
            Mutation::ChangeSetpoint { .. } => "ChangeSetpointInput!",
            Mutation::ChangeHumidification { .. } => "ChangeHumidificationInput!",
            Mutation::ChangeDehumidification { .. } => "ChangeDehumidificationInput!",
        }
    }

    /// Error variants the service may answer this mutation with.
    pub fn error_variants(&self) -> &'static [&'static str] {
        match self {
            Mutation::ChangeAway { .. } | Mutation::ChangeMode { .. } => &["NotFound"],
            Mutation::ChangeFanMode { .. }
            | Mutation::ChangeHumidification { .. }
            | Mutation::ChangeDehumidification { .. } => &["NotFound", "NotSupported"],
            Mutation::ChangeSetpoint { .. } => {
                &["NotFound", "AwayModeActive", "VacationModeActive"]
            }
        }
    }

    fn input(&self) -> Value {
        match self {
            Mutation::ChangeAway { id, active } => json!({ "id": id, "active": active }),
            Mutation::ChangeFanMode { id, mode } => json!({ "id": id, "mode": mode }),
            Mutation::ChangeMode { id, mode } => json!({ "id": id, "mode": mode }),
            Mutation::ChangeSetpoint {
                id,
                setpoint,
                value,
            } => json!({ "id": id, "setpoint": setpoint, "value": value }),
            Mutation::ChangeHumidification { id, value }
            | Mutation::ChangeDehumidification { id, value } => {
                json!({ "id": id, "value": value })
            }
        }
    }

    pub fn operation(&self) -> Operation {
        let name = self.name();
        let errors = self
            .error_variants()
            .iter()
            .map(|variant| format!("... on {} {{ message }}", variant))
            .collect::<Vec<_>>()
            .join(" ");
        Operation {
            name,
            document: format!(
                "mutation {name}($input: {input_type}) {{ {name}(input: $input) {{ __typename {errors} }} }}",
                name = name,
                input_type = self.input_type(),
                errors = errors
            ),
            variables: json!({ "input": self.input() }),
        }
    }
}
