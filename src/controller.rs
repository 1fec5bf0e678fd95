use chrono::{DateTime, Utc};
use log::{debug, info};
use std::fmt;
use std::sync::Arc;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::location::LocationInfo;
use crate::operations::Mutation;
use crate::types::{
    ActiveDemand, ConnectionStatus, ControllerData, FanMode, HumidityControl, Mode, Range,
    SetpointKind, TemperatureUnit,
};

/// Local mirror of one thermostat's state.
///
/// Accessors only read the latest snapshot. Setters validate against it, send the
/// matching mutation, and patch just the affected field once the service accepts it.
#[derive(Debug, Clone)]
pub struct Controller {
    id: String,
    name: String,
    location: Arc<LocationInfo>,
    temperature_unit: TemperatureUnit,
    data: ControllerData,
    alive: bool,
    comms_lost: bool,
    last_refresh: DateTime<Utc>,
}

impl Controller {
    /// Creates a mirror from a document obtained during discovery.
    pub fn from_document(
        location: Arc<LocationInfo>,
        temperature_unit: TemperatureUnit,
        data: ControllerData,
    ) -> Self {
        let mut controller = Self {
            id: data.id.clone(),
            name: data.name.clone(),
            location,
            temperature_unit,
            alive: false,
            comms_lost: false,
            last_refresh: Utc::now(),
            data,
        };
        controller.update_connectivity();
        controller
    }

    /// Replaces the whole snapshot with the service's current document.
    pub async fn refresh(&mut self, client: &mut Client) -> Result<()> {
        let data = client.get_controller_data(&self.id).await?;
        self.replace_snapshot(data);
        debug!("Refreshed controller {} ({})", self.id, self.name);
        Ok(())
    }

    fn replace_snapshot(&mut self, data: ControllerData) {
        self.data = data;
        self.update_connectivity();
        self.last_refresh = Utc::now();
    }

    fn update_connectivity(&mut self) {
        self.alive = !self.data.disabled;
        self.comms_lost = self.data.location.connection_status == ConnectionStatus::Offline;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the device is enabled and reachable by the service.
    pub fn is_alive(&self) -> bool {
        self.alive && !self.comms_lost
    }

    pub fn last_refresh(&self) -> DateTime<Utc> {
        self.last_refresh
    }

    pub fn away(&self) -> bool {
        self.data.away.active
    }

    pub fn fan_running(&self) -> bool {
        self.data.fan.as_ref().is_some_and(|fan| fan.active)
    }

    pub fn fan_mode(&self) -> Option<FanMode> {
        self.data.fan.as_ref().map(|fan| fan.mode)
    }

    pub fn fan_modes(&self) -> &[FanMode] {
        self.data
            .fan
            .as_ref()
            .map(|fan| fan.modes.as_slice())
            .unwrap_or_default()
    }

    pub fn system_mode(&self) -> Mode {
        self.data.mode
    }

    pub fn system_modes(&self) -> &[Mode] {
        &self.data.modes
    }

    pub fn active_demand(&self) -> ActiveDemand {
        self.data.active_demand.unwrap_or(ActiveDemand::Off)
    }

    pub fn setpoint_cool(&self) -> f64 {
        self.data.setpoints.cool
    }

    pub fn setpoint_heat(&self) -> f64 {
        self.data.setpoints.heat
    }

    pub fn cool_range(&self) -> Range {
        self.data.cool_range
    }

    pub fn heat_range(&self) -> Range {
        self.data.heat_range
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.data.indoor_temp
    }

    pub fn current_humidity(&self) -> Option<f64> {
        self.data.humidity
    }

    pub fn outdoor_temperature(&self) -> Option<f64> {
        self.data.outdoor_temp
    }

    pub fn humidification(&self) -> Option<&HumidityControl> {
        self.data.humidification.as_ref()
    }

    pub fn dehumidification(&self) -> Option<&HumidityControl> {
        self.data.dehumidification.as_ref()
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        self.temperature_unit
    }

    pub fn brand(&self) -> Option<&str> {
        self.location.brand.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.location.model.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.location.version.as_deref()
    }

    pub fn location_id(&self) -> &str {
        &self.location.id
    }

    pub fn location_name(&self) -> &str {
        &self.location.name
    }

    /// A copy of the full device document. Changes to it are not sent anywhere.
    pub fn raw_data(&self) -> ControllerData {
        self.data.clone()
    }

    pub async fn set_away(&mut self, client: &mut Client, active: bool) -> Result<()> {
        if self.away() == active {
            return Ok(());
        }
        client
            .mutate(&Mutation::ChangeAway {
                id: self.id.clone(),
                active,
            })
            .await?;
        self.data.away.active = active;
        info!("Controller {}: away set to {}", self.id, active);
        Ok(())
    }

    pub async fn set_fan_mode(&mut self, client: &mut Client, mode: FanMode) -> Result<()> {
        if mode == FanMode::Unknown || !self.fan_modes().contains(&mode) {
            return Err(Error::Validation(format!("Invalid fan mode `{}`", mode)));
        }
        if self.fan_mode() == Some(mode) {
            return Ok(());
        }
        client
            .mutate(&Mutation::ChangeFanMode {
                id: self.id.clone(),
                mode,
            })
            .await?;
        if let Some(fan) = self.data.fan.as_mut() {
            fan.mode = mode;
        }
        info!("Controller {}: fan mode set to {}", self.id, mode);
        Ok(())
    }

    pub async fn set_system_mode(&mut self, client: &mut Client, mode: Mode) -> Result<()> {
        if mode == Mode::Unknown || !self.data.modes.contains(&mode) {
            return Err(Error::Validation(format!("Invalid system mode `{}`", mode)));
        }
        if self.data.mode == mode {
            return Ok(());
        }
        client
            .mutate(&Mutation::ChangeMode {
                id: self.id.clone(),
                mode,
            })
            .await?;
        self.data.mode = mode;
        info!("Controller {}: system mode set to {}", self.id, mode);
        Ok(())
    }

    pub async fn set_setpoint_cool(&mut self, client: &mut Client, value: f64) -> Result<()> {
        self.set_setpoint(client, SetpointKind::Cool, value).await
    }

    pub async fn set_setpoint_heat(&mut self, client: &mut Client, value: f64) -> Result<()> {
        self.set_setpoint(client, SetpointKind::Heat, value).await
    }

    async fn set_setpoint(
        &mut self,
        client: &mut Client,
        setpoint: SetpointKind,
        value: f64,
    ) -> Result<()> {
        let (range, current) = match setpoint {
            SetpointKind::Cool => (self.data.cool_range, self.data.setpoints.cool),
            SetpointKind::Heat => (self.data.heat_range, self.data.setpoints.heat),
        };
        if !range.contains(value) {
            return Err(Error::Validation(format!(
                "Setpoint {} outside range {}",
                value, range
            )));
        }
        if current == value {
            return Ok(());
        }
        client
            .mutate(&Mutation::ChangeSetpoint {
                id: self.id.clone(),
                setpoint,
                value,
            })
            .await?;
        match setpoint {
            SetpointKind::Cool => self.data.setpoints.cool = value,
            SetpointKind::Heat => self.data.setpoints.heat = value,
        }
        info!("Controller {}: {} setpoint set to {}", self.id, setpoint, value);
        Ok(())
    }

    pub async fn set_humidification_target(
        &mut self,
        client: &mut Client,
        value: f64,
    ) -> Result<()> {
        self.set_humidity_target(client, HumidityTarget::Humidification, value).await
    }

    pub async fn set_dehumidification_target(
        &mut self,
        client: &mut Client,
        value: f64,
    ) -> Result<()> {
        self.set_humidity_target(client, HumidityTarget::Dehumidification, value).await
    }

    async fn set_humidity_target(
        &mut self,
        client: &mut Client,
        target: HumidityTarget,
        value: f64,
    ) -> Result<()> {
        let control = match target {
            HumidityTarget::Humidification => self.data.humidification.as_ref(),
            HumidityTarget::Dehumidification => self.data.dehumidification.as_ref(),
        }
        .ok_or_else(|| Error::Validation(format!("{} is not supported", target)))?;
        if !control.range().contains(value) {
            return Err(Error::Validation(format!(
                "Humidity {} outside range {}",
                value,
                control.range()
            )));
        }
        if control.value == Some(value) {
            return Ok(());
        }
        let id = self.id.clone();
        let mutation = match target {
            HumidityTarget::Humidification => Mutation::ChangeHumidification { id, value },
            HumidityTarget::Dehumidification => Mutation::ChangeDehumidification { id, value },
        };
        client.mutate(&mutation).await?;
        let control = match target {
            HumidityTarget::Humidification => self.data.humidification.as_mut(),
            HumidityTarget::Dehumidification => self.data.dehumidification.as_mut(),
        };
        if let Some(control) = control {
            control.value = Some(value);
        }
        info!("Controller {}: {} target set to {}", self.id, target, value);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum HumidityTarget {
    Humidification,
    Dehumidification,
}

impl fmt::Display for HumidityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HumidityTarget::Humidification => f.write_str("Humidification"),
            HumidityTarget::Dehumidification => f.write_str("Dehumidification"),
        }
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Controller<{}:{}>", self.id, self.name)
    }
}
