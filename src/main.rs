use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};

use hx3::config::{self, Config, ConfigPersister};
use hx3::transport::DEFAULT_BASE_URL;
use hx3::{
    Client, Controller, Credentials, FanMode, Fleet, FleetObserver, FleetSettings, HttpTransport,
    Mode, PollOutcome, Transport,
};

#[derive(Parser)]
#[command(name = "hx3")]
#[command(about = "A CLI for controlling Johnson Controls Hx 3 thermostats")]
#[command(version)]
struct Cli {
    /// Path to the configuration file (defaults to ~/.hx3.yml)
    #[arg(long, global = true, env = "HX3_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the thermostat API
    #[arg(
        long,
        global = true,
        env = "HX3_API_URL",
        default_value = DEFAULT_BASE_URL,
        hide = true
    )]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Login and store credentials for future use
    Login {
        /// Account email (optional, will prompt if not provided)
        #[arg(long, env = "HX3_EMAIL")]
        email: Option<String>,
        /// Account token (optional, will prompt if not provided)
        #[arg(long)]
        token: Option<String>,
        /// Only track controllers at this location
        #[arg(long)]
        location: Option<String>,
        /// Only track this controller
        #[arg(long)]
        controller: Option<String>,
    },
    /// Remove stored credentials
    Logout,
    /// Show the state of every tracked thermostat
    Status,
    /// Change the system mode (off, auto, heat, cool, eheat, ...)
    Mode {
        mode: Mode,
        /// Controller ID (optional if only one controller)
        #[arg(long)]
        controller: Option<String>,
    },
    /// Change the fan mode (auto, fifteen, thirty, fortyfive, always)
    Fan {
        mode: FanMode,
        /// Controller ID (optional if only one controller)
        #[arg(long)]
        controller: Option<String>,
    },
    /// Turn away mode on or off
    Away {
        #[arg(action = ArgAction::Set)]
        active: bool,
        /// Controller ID (optional if only one controller)
        #[arg(long)]
        controller: Option<String>,
    },
    /// Change the heating and/or cooling setpoint
    Setpoint {
        #[arg(long)]
        heat: Option<f64>,
        #[arg(long)]
        cool: Option<f64>,
        /// Controller ID (optional if only one controller)
        #[arg(long)]
        controller: Option<String>,
    },
    /// Change the humidification and/or dehumidification target
    Humidity {
        #[arg(long)]
        humidify: Option<f64>,
        #[arg(long)]
        dehumidify: Option<f64>,
        /// Controller ID (optional if only one controller)
        #[arg(long)]
        controller: Option<String>,
    },
    /// Poll every tracked thermostat until interrupted
    Watch {
        /// Seconds between polling cycles
        #[arg(long, default_value_t = 300)]
        interval: u64,
    },
}

#[derive(Tabled)]
struct ControllerRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Demand")]
    demand: String,
    #[tabled(rename = "Indoor")]
    indoor: String,
    #[tabled(rename = "Humidity")]
    humidity: String,
    #[tabled(rename = "Heat")]
    heat: String,
    #[tabled(rename = "Cool")]
    cool: String,
    #[tabled(rename = "Fan")]
    fan: String,
    #[tabled(rename = "Away")]
    away: String,
    #[tabled(rename = "Online")]
    online: String,
}

impl From<&Controller> for ControllerRow {
    fn from(controller: &Controller) -> Self {
        let unit = controller.temperature_unit().symbol();
        let temperature = |value: Option<f64>| {
            value.map_or_else(|| "-".to_string(), |v| format!("{}{}", v, unit))
        };
        Self {
            id: controller.id().to_string(),
            name: controller.name().to_string(),
            location: controller.location_name().to_string(),
            mode: controller.system_mode().to_string(),
            demand: controller.active_demand().to_string(),
            indoor: temperature(controller.current_temperature()),
            humidity: controller
                .current_humidity()
                .map_or_else(|| "-".to_string(), |v| format!("{}%", v)),
            heat: temperature(Some(controller.setpoint_heat())),
            cool: temperature(Some(controller.setpoint_cool())),
            fan: controller
                .fan_mode()
                .map_or_else(|| "-".to_string(), |m| m.to_string()),
            away: if controller.away() { "Yes" } else { "No" }.to_string(),
            online: if controller.is_alive() { "Yes" } else { "No" }.to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config::get_config_path()?,
    };
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new_with_base_url(cli.api_url.clone()));

    match cli.command {
        Commands::Login {
            email,
            token,
            location,
            controller,
        } => {
            let email = match email {
                Some(email) => email,
                None => prompt("Email: ")?,
            };
            let token = match token {
                Some(token) => token,
                None => rpassword::prompt_password("Token: ").context("Failed to read token")?,
            };

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                    .template("{spinner:.green} {msg}")?,
            );
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner.set_message("Signing in...");

            let result = Client::connect(Credentials::with_token(&email, token), transport).await;
            spinner.finish_and_clear();
            let client = result?;

            let mut config = Config::from(&client.session().snapshot());
            config.location_id = location;
            config.controller_id = controller;
            config::save_config_to(&config_path, &config)?;

            println!("Logged in as {}", email);
        }
        Commands::Logout => {
            config::clear_config_at(&config_path)?;
            println!("Logged out successfully");
        }
        Commands::Status => {
            let (fleet, persister) =
                start_fleet(&config_path, transport, FleetSettings::default()).await?;
            persist(&fleet, &persister);

            let rows: Vec<ControllerRow> =
                fleet.controllers().iter().map(ControllerRow::from).collect();
            println!("{}", Table::new(&rows));
        }
        Commands::Mode { mode, controller } => {
            let (mut fleet, persister) =
                start_fleet(&config_path, transport, FleetSettings::default()).await?;
            let (client, controllers) = fleet.split_mut();
            let target = select_controller(controllers, controller.as_deref())?;
            target.set_system_mode(client, mode).await?;
            println!("{}: mode set to {}", target.name(), mode);
            persist(&fleet, &persister);
        }
        Commands::Fan { mode, controller } => {
            let (mut fleet, persister) =
                start_fleet(&config_path, transport, FleetSettings::default()).await?;
            let (client, controllers) = fleet.split_mut();
            let target = select_controller(controllers, controller.as_deref())?;
            target.set_fan_mode(client, mode).await?;
            println!("{}: fan mode set to {}", target.name(), mode);
            persist(&fleet, &persister);
        }
        Commands::Away { active, controller } => {
            let (mut fleet, persister) =
                start_fleet(&config_path, transport, FleetSettings::default()).await?;
            let (client, controllers) = fleet.split_mut();
            let target = select_controller(controllers, controller.as_deref())?;
            target.set_away(client, active).await?;
            println!(
                "{}: away mode {}",
                target.name(),
                if active { "on" } else { "off" }
            );
            persist(&fleet, &persister);
        }
        Commands::Setpoint {
            heat,
            cool,
            controller,
        } => {
            if heat.is_none() && cool.is_none() {
                return Err(anyhow::anyhow!("Provide --heat and/or --cool."));
            }
            let (mut fleet, persister) =
                start_fleet(&config_path, transport, FleetSettings::default()).await?;
            let (client, controllers) = fleet.split_mut();
            let target = select_controller(controllers, controller.as_deref())?;
            let unit = target.temperature_unit().symbol();
            if let Some(value) = heat {
                target.set_setpoint_heat(client, value).await?;
                println!("{}: heat setpoint set to {}{}", target.name(), value, unit);
            }
            if let Some(value) = cool {
                target.set_setpoint_cool(client, value).await?;
                println!("{}: cool setpoint set to {}{}", target.name(), value, unit);
            }
            persist(&fleet, &persister);
        }
        Commands::Humidity {
            humidify,
            dehumidify,
            controller,
        } => {
            if humidify.is_none() && dehumidify.is_none() {
                return Err(anyhow::anyhow!("Provide --humidify and/or --dehumidify."));
            }
            let (mut fleet, persister) =
                start_fleet(&config_path, transport, FleetSettings::default()).await?;
            let (client, controllers) = fleet.split_mut();
            let target = select_controller(controllers, controller.as_deref())?;
            if let Some(value) = humidify {
                target.set_humidification_target(client, value).await?;
                println!("{}: humidification target set to {}%", target.name(), value);
            }
            if let Some(value) = dehumidify {
                target.set_dehumidification_target(client, value).await?;
                println!("{}: dehumidification target set to {}%", target.name(), value);
            }
            persist(&fleet, &persister);
        }
        Commands::Watch { interval } => {
            let interval = Duration::from_secs(interval);
            let settings = FleetSettings {
                min_interval: interval,
                ..Default::default()
            };
            let (fleet, persister) = start_fleet(&config_path, transport, settings).await?;
            let mut fleet = fleet.with_observer(persister);

            tokio::select! {
                result = watch(&mut fleet, interval) => result?,
                _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping"),
            }
        }
    }

    Ok(())
}

async fn watch(fleet: &mut Fleet, interval: Duration) -> Result<()> {
    loop {
        match fleet.poll().await? {
            PollOutcome::Completed { recoveries } => {
                if recoveries > 0 {
                    info!("Cycle completed after {} session recoveries", recoveries);
                }
                let rows: Vec<ControllerRow> =
                    fleet.controllers().iter().map(ControllerRow::from).collect();
                println!("{}", Table::new(&rows));
            }
            PollOutcome::Skipped => debug!("Cycle skipped"),
        }
        tokio::time::sleep(interval).await;
    }
}

async fn start_fleet(
    config_path: &Path,
    transport: Arc<dyn Transport>,
    settings: FleetSettings,
) -> Result<(Fleet, Arc<ConfigPersister>)> {
    let config = config::load_config_from(config_path)?;
    let fleet = Fleet::start(
        Credentials::from(&config),
        config.scope(),
        transport,
        settings,
    )
    .await?;
    let persister = Arc::new(ConfigPersister::new(config_path.to_path_buf(), config));
    Ok((fleet, persister))
}

/// Stores tokens that were refreshed while running a one-shot command.
fn persist(fleet: &Fleet, persister: &ConfigPersister) {
    persister.on_session_persisted(&fleet.client().session().snapshot());
}

fn select_controller<'a>(
    controllers: &'a mut [Controller],
    id: Option<&str>,
) -> Result<&'a mut Controller> {
    match id {
        Some(id) => controllers
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(|| anyhow::anyhow!("Controller {} not found.", id)),
        None => match controllers {
            [only] => Ok(only),
            [] => Err(anyhow::anyhow!("No controllers found for this account.")),
            _ => Err(anyhow::anyhow!(
                "Multiple controllers found. Please specify --controller."
            )),
        },
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read input")?;
    Ok(input.trim().to_string())
}
