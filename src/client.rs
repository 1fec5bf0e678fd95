use log::{debug, error, info};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::location::LocationRegistry;
use crate::operations::{payload_error, Mutation, Operation};
use crate::session::Session;
use crate::transport::{HttpTransport, Transport};
use crate::types::{ControllerData, Credentials, LocationData, TemperatureUnit};

/// An authenticated connection to the thermostat service.
pub struct Client {
    executor: Executor,
    session: Session,
}

impl Client {
    /// Builds a session from persisted credentials.
    ///
    /// A stored access token is refreshed immediately (its lifetime is treated as
    /// unknown) and the account's temperature unit is re-read. Without one, the
    /// long-lived token is exchanged through a full sign-in.
    pub async fn connect(credentials: Credentials, transport: Arc<dyn Transport>) -> Result<Self> {
        let mut client = Self {
            executor: Executor::new(transport),
            session: Session::new(credentials),
        };

        if client.session.access_token().is_some() {
            debug!("Resuming session from stored access token");
            client.session.invalidate_ttl();
            client
                .session
                .refresh(client.executor.transport().as_ref())
                .await?;
            client.me().await?;
        } else if client.session.has_token() {
            client
                .session
                .authenticate(client.executor.transport().as_ref())
                .await?;
        } else {
            return Err(Error::Auth(
                "A valid token or access_token is required.".to_string(),
            ));
        }

        info!("Connected as {}", client.session.email());
        Ok(client)
    }

    /// Connects to the production endpoint.
    pub async fn connect_default(credentials: Credentials) -> Result<Self> {
        Self::connect(credentials, Arc::new(HttpTransport::new())).await
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(self.executor.transport())
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        self.session.temperature_unit().unwrap_or_default()
    }

    pub async fn execute(&mut self, operation: &Operation) -> Result<Value> {
        self.executor
            .execute(Some(&mut self.session), operation)
            .await
    }

    /// Reads the account's temperature unit.
    pub async fn me(&mut self) -> Result<TemperatureUnit> {
        let data = self.execute(&Operation::me()).await?;
        let unit: TemperatureUnit = data
            .pointer("/me/temperatureUnit")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| Error::Api("Missing temperature unit in response".to_string()))?;
        self.session.set_temperature_unit(unit);
        Ok(unit)
    }

    pub async fn get_locations(&mut self) -> Result<Vec<LocationData>> {
        debug!("Fetching locations");
        let mut data = self.execute(&Operation::locations()).await?;
        let locations = data
            .get_mut("locations")
            .map(Value::take)
            .ok_or_else(|| Error::Api("Missing locations in response".to_string()))?;
        let locations: Vec<LocationData> = serde_json::from_value(locations)?;
        debug!("Found {} locations", locations.len());
        Ok(locations)
    }

    /// Builds the location/controller graph for this account.
    pub async fn discover(&mut self) -> Result<LocationRegistry> {
        let locations = self.get_locations().await?;
        Ok(LocationRegistry::from_documents(
            locations,
            self.temperature_unit(),
        ))
    }

    /// Fetches the full device-state document for one controller.
    pub async fn get_controller_data(&mut self, controller_id: &str) -> Result<ControllerData> {
        debug!("Fetching state for controller: {}", controller_id);
        let mut data = self.execute(&Operation::controller(controller_id)).await?;
        let document = data
            .get_mut("controller")
            .map(Value::take)
            .filter(|doc| !doc.is_null())
            .ok_or_else(|| {
                error!("API reported failure to query device {}", controller_id);
                Error::Api(format!(
                    "API reported failure to query device {}",
                    controller_id
                ))
            })?;
        Ok(serde_json::from_value(document)?)
    }

    /// Runs a mutation and surfaces the service's typed rejection, if any.
    pub async fn mutate(&mut self, mutation: &Mutation) -> Result<()> {
        let name = mutation.name();
        debug!("Running {}: {:?}", name, mutation);

        let data = self.execute(&mutation.operation()).await?;
        let rejection = payload_error(&data).or_else(|| data.get(name).and_then(payload_error));
        if let Some((kind, message)) = rejection {
            error!("Failed to run {}: {}", name, message);
            return Err(Error::Remote { kind, message });
        }

        debug!("{} succeeded", name);
        Ok(())
    }
}
