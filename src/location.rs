use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::controller::Controller;
use crate::types::{LocationData, TemperatureUnit};

/// Descriptive data for a location, shared by its controllers.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationInfo {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    /// Bootloader firmware version
    pub version: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug)]
pub struct Location {
    info: Arc<LocationInfo>,
    controllers: Vec<Controller>,
}

impl Location {
    pub fn from_document(document: LocationData, unit: TemperatureUnit) -> Self {
        let info = Arc::new(LocationInfo {
            id: document.id,
            name: document.name,
            brand: document.brand,
            model: document.model,
            version: document.version.bootloader,
            latitude: document.lat,
            longitude: document.lng,
        });
        let controllers = document
            .controllers
            .into_iter()
            .map(|data| Controller::from_document(Arc::clone(&info), unit, data))
            .collect();
        Self { info, controllers }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &LocationInfo {
        &self.info
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub fn controllers_by_id(&self) -> HashMap<&str, &Controller> {
        self.controllers.iter().map(|c| (c.id(), c)).collect()
    }

    /// Controllers keyed by their user-set name. Later duplicates win.
    pub fn controllers_by_name(&self) -> HashMap<&str, &Controller> {
        self.controllers.iter().map(|c| (c.name(), c)).collect()
    }
}

/// Restricts a fleet to one location and/or one controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetScope {
    pub location_id: Option<String>,
    pub controller_id: Option<String>,
}

impl FleetScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, location_id: &str, controller_id: &str) -> bool {
        self.location_id.as_deref().map_or(true, |id| id == location_id)
            && self.controller_id.as_deref().map_or(true, |id| id == controller_id)
    }
}

/// Every location discovered for an account.
#[derive(Debug, Default)]
pub struct LocationRegistry {
    locations: Vec<Location>,
}

impl LocationRegistry {
    pub fn from_documents(documents: Vec<LocationData>, unit: TemperatureUnit) -> Self {
        Self {
            locations: documents
                .into_iter()
                .map(|doc| Location::from_document(doc, unit))
                .collect(),
        }
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn location(&self, id: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.id() == id)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.locations.iter().flat_map(|l| l.controllers.iter())
    }

    pub fn controller(&self, id: &str) -> Option<&Controller> {
        self.controllers().find(|c| c.id() == id)
    }

    /// The first controller found; handy for single-thermostat accounts.
    pub fn default_controller(&self) -> Option<&Controller> {
        self.controllers().next()
    }

    /// Consumes the registry, keeping only the controllers inside `scope`.
    pub fn into_controllers(self, scope: &FleetScope) -> Vec<Controller> {
        self.locations
            .into_iter()
            .flat_map(|location| location.controllers)
            .filter(|c| scope.matches(c.location_id(), c.id()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;

    fn registry() -> LocationRegistry {
        let docs: Vec<LocationData> = serde_json::from_value(serde_json::json!([
            mock::location_document(
                "loc1",
                "Home",
                vec![
                    mock::controller_document("c1", "Upstairs"),
                    mock::controller_document("c2", "Downstairs"),
                ],
            ),
            mock::location_document("loc2", "Cabin", vec![mock::controller_document("c3", "Main")]),
        ]))
        .unwrap();
        LocationRegistry::from_documents(docs, TemperatureUnit::Fahrenheit)
    }

    #[test]
    fn test_location_metadata() {
        let registry = registry();
        let home = registry.location("loc1").unwrap();

        assert_eq!(home.name(), "Home");
        assert_eq!(home.info().version.as_deref(), Some("1.0.4"));
        assert_eq!(home.info().brand.as_deref(), Some("Johnson Controls"));
        assert_eq!(home.controllers_by_id().len(), 2);
        assert!(home.controllers_by_name().contains_key("Downstairs"));

        let main = registry.controller("c3").unwrap();
        assert_eq!(main.location_name(), "Cabin");
        assert_eq!(main.location_id(), "loc2");
    }

    #[test]
    fn test_default_controller() {
        assert_eq!(registry().default_controller().unwrap().id(), "c1");
        assert!(LocationRegistry::default().default_controller().is_none());
    }

    #[test]
    fn test_scope_filtering() {
        let ids = |scope: FleetScope| -> Vec<String> {
            registry()
                .into_controllers(&scope)
                .iter()
                .map(|c| c.id().to_string())
                .collect()
        };

        assert_eq!(ids(FleetScope::all()), vec!["c1", "c2", "c3"]);
        assert_eq!(
            ids(FleetScope {
                location_id: Some("loc1".to_string()),
                controller_id: None,
            }),
            vec!["c1", "c2"]
        );
        assert_eq!(
            ids(FleetScope {
                location_id: None,
                controller_id: Some("c3".to_string()),
            }),
            vec!["c3"]
        );
        assert!(ids(FleetScope {
            location_id: Some("loc2".to_string()),
            controller_id: Some("c1".to_string()),
        })
        .is_empty());
    }
}
