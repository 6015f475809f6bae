use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_schemas::{time_of_day, DeviceIdentity, Employee, EmployeeCalendar, WorkInterval};
use uuid::Uuid;

use crate::LoadedConfig;

/// Namespace for ids derived from config names, so a reload keeps ids stable.
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2a8e_5b07_4c39_9e1f_3d2c_7a40_b815);

/// Typed view of the merged configuration. Every section is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyConfig {
    /// Default IANA zone for employees without one.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub reconcile: ReconcileSection,
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub directory: DirectorySection,
    #[serde(default)]
    pub daemon: DaemonSection,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            reconcile: ReconcileSection::default(),
            device: DeviceSection::default(),
            directory: DirectorySection::default(),
            daemon: DaemonSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSection {
    #[serde(with = "time_of_day")]
    pub previous_day_cutoff: NaiveTime,
    #[serde(with = "time_of_day")]
    pub late_checkout_cutoff: NaiveTime,
    #[serde(with = "time_of_day")]
    pub inferred_check_in: NaiveTime,
    pub bulk_duplicate_window_secs: i64,
    /// How far around a punch the employee ledger is loaded.
    pub ledger_horizon_hours: i64,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            previous_day_cutoff: hm(4, 0),
            late_checkout_cutoff: hm(5, 0),
            inferred_check_in: hm(8, 0),
            bulk_duplicate_window_secs: 600,
            ledger_horizon_hours: 48,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// Upper bound on any single device call.
    pub timeout_secs: u64,
    pub page_size: u32,
    /// Zone the device clock runs in; bulk query ranges are expressed in it.
    pub timezone: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            page_size: 30,
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySection {
    /// Create employees for unknown biometric codes from device payloads.
    pub auto_provision_unknown: bool,
    pub devices: Vec<DeviceEntry>,
    pub employees: Vec<EmployeeEntry>,
    /// Weekly calendars keyed by name.
    pub calendars: BTreeMap<String, Vec<WorkInterval>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub local_address: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    /// NAME of the env var holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

impl DeviceEntry {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            device_id: self.id.unwrap_or_else(|| derived_id("device", &self.name)),
            name: self.name.clone(),
            address: self.address.clone(),
            local_address: self.local_address.clone(),
            port: self.port,
            username: self.username.clone(),
            password_env: self.password_env.clone(),
            is_public: self.is_public,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeEntry {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub biometric_code: String,
    /// Name of the device the employee is enrolled on.
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// Key into `directory.calendars`.
    #[serde(default)]
    pub calendar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub bind_addr: String,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8899".to_string(),
        }
    }
}

/// Seed records for a directory, with ids resolved and references checked.
#[derive(Debug, Clone, Default)]
pub struct DirectorySeed {
    pub devices: Vec<DeviceIdentity>,
    pub employees: Vec<Employee>,
    pub calendars: BTreeMap<Uuid, EmployeeCalendar>,
}

impl TallyConfig {
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        Self::from_json(&loaded.config_json)
    }

    pub fn from_json(config_json: &serde_json::Value) -> Result<Self> {
        let cfg: TallyConfig =
            serde_json::from_value(config_json.clone()).context("config does not match schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        parse_zone(&self.timezone).context("timezone")?;
        parse_zone(&self.device.timezone).context("device.timezone")?;
        if self.reconcile.bulk_duplicate_window_secs < 0 {
            bail!("reconcile.bulk_duplicate_window_secs must be >= 0");
        }
        if self.reconcile.ledger_horizon_hours <= 0 {
            bail!("reconcile.ledger_horizon_hours must be > 0");
        }
        if self.device.page_size == 0 {
            bail!("device.page_size must be > 0");
        }
        for e in &self.directory.employees {
            if let Some(tz) = &e.timezone {
                parse_zone(tz).with_context(|| format!("employee '{}' timezone", e.name))?;
            }
            if let Some(dev) = &e.device {
                if !self.directory.devices.iter().any(|d| &d.name == dev) {
                    bail!("employee '{}' references unknown device '{}'", e.name, dev);
                }
            }
            if let Some(cal) = &e.calendar {
                if !self.directory.calendars.contains_key(cal) {
                    bail!("employee '{}' references unknown calendar '{}'", e.name, cal);
                }
            }
        }
        Ok(())
    }

    pub fn default_tz(&self) -> Result<Tz> {
        parse_zone(&self.timezone)
    }

    pub fn device_tz(&self) -> Result<Tz> {
        parse_zone(&self.device.timezone)
    }

    /// Resolve the `directory` section into domain records.
    pub fn directory_seed(&self) -> DirectorySeed {
        let devices: Vec<DeviceIdentity> =
            self.directory.devices.iter().map(DeviceEntry::identity).collect();
        let mut seed = DirectorySeed {
            devices,
            ..DirectorySeed::default()
        };
        for e in &self.directory.employees {
            let employee_id = e.id.unwrap_or_else(|| derived_id("employee", &e.biometric_code));
            let device_id = e.device.as_ref().and_then(|name| {
                seed.devices
                    .iter()
                    .find(|d| &d.name == name)
                    .map(|d| d.device_id)
            });
            if let Some((name, intervals)) = e
                .calendar
                .as_ref()
                .and_then(|c| self.directory.calendars.get_key_value(c))
            {
                seed.calendars
                    .insert(employee_id, EmployeeCalendar::new(name.clone(), intervals.clone()));
            }
            seed.employees.push(Employee {
                employee_id,
                name: e.name.clone(),
                biometric_code: e.biometric_code.clone(),
                device_id,
                timezone: e.timezone.clone(),
            });
        }
        seed
    }
}

fn parse_zone(name: &str) -> Result<Tz> {
    match name.trim().parse::<Tz>() {
        Ok(tz) => Ok(tz),
        Err(_) => bail!("unknown IANA timezone '{name}'"),
    }
}

fn derived_id(kind: &str, name: &str) -> Uuid {
    Uuid::new_v5(&ID_NAMESPACE, format!("{kind}:{name}").as_bytes())
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_port() -> u16 {
    80
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}
