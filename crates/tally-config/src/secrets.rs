//! Device credential resolution.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (`password_env: "TALLY_DEVICE_LOBBY_PASSWORD"`).
//! - Callers resolve once at startup with [`resolve_device_secrets`] and pass
//!   the result into constructors; no `std::env::var` calls elsewhere.
//! - `Debug` redacts values.
//! - Errors name the env var, never the value.
//!
//! A device without a resolvable password can still receive webhooks; only
//! operations that call the device (bulk download) require it.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use tally_schemas::DeviceIdentity;
use uuid::Uuid;

/// Passwords keyed by device id.
#[derive(Clone, Default)]
pub struct ResolvedDeviceSecrets {
    passwords: BTreeMap<Uuid, String>,
}

impl std::fmt::Debug for ResolvedDeviceSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut m = f.debug_map();
        for id in self.passwords.keys() {
            m.entry(id, &"<REDACTED>");
        }
        m.finish()
    }
}

impl ResolvedDeviceSecrets {
    pub fn password_for(&self, device_id: Uuid) -> Option<&str> {
        self.passwords.get(&device_id).map(String::as_str)
    }

    /// Password for `device`, or an error naming the variable to set.
    pub fn require_password(&self, device: &DeviceIdentity) -> Result<&str> {
        if let Some(p) = self.password_for(device.device_id) {
            return Ok(p);
        }
        match &device.password_env {
            Some(var) => bail!(
                "SECRETS_MISSING device={}: env var '{}' is not set or empty",
                device.name,
                var
            ),
            None => bail!(
                "SECRETS_MISSING device={}: no password_env configured",
                device.name
            ),
        }
    }

    pub fn insert(&mut self, device_id: Uuid, password: impl Into<String>) {
        self.passwords.insert(device_id, password.into());
    }
}

/// Read every device's `password_env` from the process environment.
/// Unset or blank variables are skipped.
pub fn resolve_device_secrets(devices: &[DeviceIdentity]) -> ResolvedDeviceSecrets {
    let mut out = ResolvedDeviceSecrets::default();
    for d in devices {
        if let Some(value) = d.password_env.as_deref().and_then(resolve_env) {
            out.insert(d.device_id, value);
        }
    }
    out
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(env: Option<&str>) -> DeviceIdentity {
        DeviceIdentity {
            device_id: Uuid::new_v4(),
            name: "lobby".to_string(),
            address: "10.0.0.5".to_string(),
            local_address: None,
            port: 80,
            username: "admin".to_string(),
            password_env: env.map(str::to_string),
            is_public: false,
        }
    }

    #[test]
    fn resolves_named_var_and_redacts_debug() {
        std::env::set_var("TALLY_TEST_SECRET_RESOLVES", "hunter22");
        let d = device(Some("TALLY_TEST_SECRET_RESOLVES"));
        let s = resolve_device_secrets(std::slice::from_ref(&d));
        assert_eq!(s.require_password(&d).unwrap(), "hunter22");
        assert!(!format!("{s:?}").contains("hunter22"));
    }

    #[test]
    fn missing_var_error_names_variable_only() {
        std::env::remove_var("TALLY_TEST_SECRET_MISSING");
        let d = device(Some("TALLY_TEST_SECRET_MISSING"));
        let s = resolve_device_secrets(std::slice::from_ref(&d));
        let msg = s.require_password(&d).unwrap_err().to_string();
        assert!(msg.contains("TALLY_TEST_SECRET_MISSING"));
        assert!(msg.contains("SECRETS_MISSING"));
    }

    #[test]
    fn blank_var_counts_as_missing() {
        std::env::set_var("TALLY_TEST_SECRET_BLANK", "   ");
        let d = device(Some("TALLY_TEST_SECRET_BLANK"));
        assert!(resolve_device_secrets(std::slice::from_ref(&d))
            .password_for(d.device_id)
            .is_none());
    }
}
