//! Fleet Poller: periodic refresh of every tracked controller, with full
//! session recovery when a cycle hits a transient failure.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::client::Client;
use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::location::FleetScope;
use crate::transport::Transport;
use crate::types::Credentials;

/// Receives the fleet's side effects that outlive a single cycle.
pub trait FleetObserver: Send + Sync {
    /// Called after every successful cycle with the token state to persist.
    fn on_session_persisted(&self, credentials: &Credentials);

    /// Called after a recovery replaced the client and controller objects.
    fn on_topology_changed(&self, _controllers: &[Controller]) {}
}

#[derive(Debug, Clone)]
pub struct FleetSettings {
    /// Attempts per cycle, including the first one
    pub attempts: u32,
    /// Pause after each controller refresh
    pub refresh_delay: Duration,
    /// Cycles requested sooner than this after the previous one are skipped
    pub min_interval: Duration,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            refresh_delay: Duration::from_secs(5),
            min_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The previous cycle started less than `min_interval` ago.
    Skipped,
    /// Every tracked controller was refreshed.
    Completed { recoveries: u32 },
}

pub struct Fleet {
    client: Client,
    controllers: Vec<Controller>,
    scope: FleetScope,
    settings: FleetSettings,
    observer: Option<Arc<dyn FleetObserver>>,
    last_cycle: Option<Instant>,
}

impl Fleet {
    /// Connects, discovers the account's locations and keeps the controllers inside `scope`.
    pub async fn start(
        credentials: Credentials,
        scope: FleetScope,
        transport: Arc<dyn Transport>,
        settings: FleetSettings,
    ) -> Result<Self> {
        let (client, controllers) = Self::build(credentials, &scope, transport).await?;
        info!("Tracking {} controllers", controllers.len());
        Ok(Self {
            client,
            controllers,
            scope,
            settings,
            observer: None,
            last_cycle: None,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn FleetObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    async fn build(
        credentials: Credentials,
        scope: &FleetScope,
        transport: Arc<dyn Transport>,
    ) -> Result<(Client, Vec<Controller>)> {
        let mut client = Client::connect(credentials, transport).await?;
        let controllers = client.discover().await?.into_controllers(scope);
        if controllers.is_empty() {
            debug!("No devices found for scope {:?}", scope);
            return Err(Error::NoControllers);
        }
        Ok((client, controllers))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub fn controller(&self, id: &str) -> Option<&Controller> {
        self.controllers.iter().find(|c| c.id() == id)
    }

    pub fn scope(&self) -> &FleetScope {
        &self.scope
    }

    /// Borrows the client and the controllers together, for issuing writes.
    pub fn split_mut(&mut self) -> (&mut Client, &mut [Controller]) {
        (&mut self.client, &mut self.controllers)
    }

    /// Runs a polling cycle unless one started within `min_interval`.
    pub async fn poll(&mut self) -> Result<PollOutcome> {
        let now = Instant::now();
        if let Some(last) = self.last_cycle {
            if now.duration_since(last) < self.settings.min_interval {
                debug!("Skipping poll, previous cycle started {:?} ago", now - last);
                return Ok(PollOutcome::Skipped);
            }
        }
        self.last_cycle = Some(now);

        let recoveries = self.run_cycle().await?;
        Ok(PollOutcome::Completed { recoveries })
    }

    /// Refreshes every tracked controller, recovering the session between
    /// attempts. Returns how many recoveries were needed.
    pub async fn run_cycle(&mut self) -> Result<u32> {
        let mut attempts_left = self.settings.attempts.max(1);
        let mut recoveries = 0;

        loop {
            let err = match self.refresh_all().await {
                Ok(()) => {
                    self.persist_session();
                    return Ok(recoveries);
                }
                Err(err) if err.is_recoverable() => err,
                Err(err) => return Err(err),
            };

            attempts_left -= 1;
            if attempts_left == 0 {
                error!("Update failed, no attempts left: {}", err);
                return Err(err);
            }

            if let Err(recovery_err) = self.recover().await {
                warn!("Session recovery failed: {}", recovery_err);
                return Err(err);
            }
            recoveries += 1;
            error!("Update failed, retrying - Error: {}", err);
        }
    }

    async fn refresh_all(&mut self) -> Result<()> {
        for controller in self.controllers.iter_mut() {
            controller.refresh(&mut self.client).await?;
            if !self.settings.refresh_delay.is_zero() {
                sleep(self.settings.refresh_delay).await;
            }
        }
        Ok(())
    }

    /// Rebuilds the session and the controller graph from the last known credentials.
    async fn recover(&mut self) -> Result<()> {
        info!("Recreating client session");
        let credentials = self.client.session().snapshot();
        let transport = self.client.transport();

        let (client, controllers) = Self::build(credentials, &self.scope, transport).await?;
        self.client = client;
        self.controllers = controllers;

        if let Some(observer) = &self.observer {
            observer.on_topology_changed(&self.controllers);
        }
        Ok(())
    }

    fn persist_session(&self) {
        if let Some(observer) = &self.observer {
            observer.on_session_persisted(&self.client.session().snapshot());
        }
    }
}
