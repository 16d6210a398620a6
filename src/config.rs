use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::model::PackingDefaults;
use crate::optimizer::PackingConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(&env_string)
    }

    /// Creates a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            api: ApiConfig::from_lookup(lookup),
            engine: EngineConfig::from_lookup(lookup),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "CARTON_PACKER_API_HOST";
    const PORT_VAR: &'static str = "CARTON_PACKER_API_PORT";

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let default_ip = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let host_value = lookup(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                tracing::warn!(
                    "Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (default_ip, Self::DEFAULT_HOST.to_string())
            }
        };

        let port = match lookup(Self::PORT_VAR) {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    tracing::warn!(
                        "{} must not be 0. Using {}.",
                        Self::PORT_VAR,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    tracing::warn!(
                        "Could not parse {} ('{}'): {}. Using {}.",
                        Self::PORT_VAR,
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Configuration for the packing engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    packing: PackingConfig,
    max_split_boxes: usize,
}

impl EngineConfig {
    const MULTIPLIER_VAR: &'static str = "CARTON_PACKER_PACKAGING_MULTIPLIER";
    const BOX_PADDING_VAR: &'static str = "CARTON_PACKER_BOX_PADDING";
    const ORIENTATION_REUSE_VAR: &'static str = "CARTON_PACKER_ALLOW_ORIENTATION_REUSE";
    const SIDE_MARGIN_VAR: &'static str = "CARTON_PACKER_DEFAULT_SIDE_MARGIN";
    const FRONT_MARGIN_VAR: &'static str = "CARTON_PACKER_DEFAULT_FRONT_MARGIN";
    const TOP_MARGIN_VAR: &'static str = "CARTON_PACKER_DEFAULT_TOP_MARGIN";
    const GAP_XY_VAR: &'static str = "CARTON_PACKER_DEFAULT_GAP_XY";
    const GAP_Z_VAR: &'static str = "CARTON_PACKER_DEFAULT_GAP_Z";
    const MAX_STACK_LAYERS_VAR: &'static str = "CARTON_PACKER_DEFAULT_MAX_STACK_LAYERS";
    const MAX_SPLIT_BOXES_VAR: &'static str = "CARTON_PACKER_MAX_SPLIT_BOXES";
    pub const DEFAULT_MAX_SPLIT_BOXES: usize = 50;

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let non_negative = |value: f64| value >= 0.0;

        let packaging_multiplier = load_f64_with_warning(
            lookup,
            Self::MULTIPLIER_VAR,
            PackingConfig::DEFAULT_PACKAGING_MULTIPLIER,
            non_negative,
            "must be 0 or greater",
            "Packaging weight estimate differs from the default",
        );

        let box_padding = load_f64_with_warning(
            lookup,
            Self::BOX_PADDING_VAR,
            PackingConfig::DEFAULT_BOX_PADDING,
            non_negative,
            "must be 0 or greater",
            "Box padding reduces the usable space of every box",
        );

        let allow_orientation_reuse = lookup(Self::ORIENTATION_REUSE_VAR)
            .and_then(|raw| parse_bool(&raw, Self::ORIENTATION_REUSE_VAR))
            .unwrap_or(PackingConfig::DEFAULT_ALLOW_ORIENTATION_REUSE);

        let margin = |var: &str, what: &str| {
            load_f64_with_warning(lookup, var, 0.0, non_negative, "must be 0 or greater", what)
        };
        let defaults = PackingDefaults {
            side_margin: margin(Self::SIDE_MARGIN_VAR, "Default side margin is set"),
            front_margin: margin(Self::FRONT_MARGIN_VAR, "Default front margin is set"),
            top_margin: margin(Self::TOP_MARGIN_VAR, "Default top margin is set"),
            gap_xy: margin(Self::GAP_XY_VAR, "Default horizontal gap is set"),
            gap_z: margin(Self::GAP_Z_VAR, "Default vertical gap is set"),
            max_stack_layers: load_positive_u32(lookup, Self::MAX_STACK_LAYERS_VAR),
            unit_weight_kg: None,
        };

        let packing = PackingConfig::builder()
            .packaging_multiplier(packaging_multiplier)
            .box_padding(box_padding)
            .allow_orientation_reuse(allow_orientation_reuse)
            .defaults(defaults)
            .build();

        let max_split_boxes = match lookup(Self::MAX_SPLIT_BOXES_VAR) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(value) if value > 0 => value,
                _ => {
                    tracing::warn!(
                        "{} must be a positive integer, got '{}'. Using {}.",
                        Self::MAX_SPLIT_BOXES_VAR,
                        raw,
                        Self::DEFAULT_MAX_SPLIT_BOXES
                    );
                    Self::DEFAULT_MAX_SPLIT_BOXES
                }
            },
            None => Self::DEFAULT_MAX_SPLIT_BOXES,
        };

        Self {
            packing,
            max_split_boxes,
        }
    }

    /// Returns the configured PackingConfig.
    pub fn packing_config(&self) -> PackingConfig {
        self.packing
    }

    /// Upper bound for `maxBoxes` on split requests.
    pub fn max_split_boxes(&self) -> usize {
        self.max_split_boxes
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            tracing::warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            tracing::warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name,
                other
            );
            None
        }
    }
}

fn load_f64_with_warning(
    lookup: &dyn Fn(&str) -> Option<String>,
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    notice: &str,
) -> f64 {
    match lookup(var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) if value.is_finite() && validator(value) => {
                let tolerance = (default.abs().max(1.0)) * 1e-9;
                if (value - default).abs() > tolerance {
                    tracing::info!("{} ({} = {}).", notice, var_name, value);
                }
                value
            }
            Ok(_) => {
                tracing::warn!(
                    "{} contains invalid value '{}': {}. Using {}.",
                    var_name,
                    raw,
                    invalid_hint,
                    default
                );
                default
            }
            Err(err) => {
                tracing::warn!(
                    "Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name,
                    raw,
                    err,
                    default
                );
                default
            }
        },
        None => default,
    }
}

fn load_positive_u32(lookup: &dyn Fn(&str) -> Option<String>, var_name: &str) -> Option<u32> {
    let raw = lookup(var_name)?;
    match raw.parse::<u32>() {
        Ok(value) if value > 0 => {
            tracing::info!("Default stack limit is set ({} = {}).", var_name, value);
            Some(value)
        }
        _ => {
            tracing::warn!(
                "{} must be a positive integer, got '{}'. No default stack limit.",
                var_name,
                raw
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_bool_true_values() {
        assert_eq!(parse_bool("1", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("true", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("yes", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("y", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("on", "TEST_VAR"), Some(true));

        // Test case insensitivity
        assert_eq!(parse_bool("TRUE", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("ON", "TEST_VAR"), Some(true));

        // Test with whitespace
        assert_eq!(parse_bool(" true ", "TEST_VAR"), Some(true));
    }

    #[test]
    fn test_parse_bool_false_values() {
        assert_eq!(parse_bool("0", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("false", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("no", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("n", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("OFF", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("  0  ", "TEST_VAR"), Some(false));
    }

    #[test]
    fn test_parse_bool_invalid_values() {
        assert_eq!(parse_bool("invalid", "TEST_VAR"), None);
        assert_eq!(parse_bool("2", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn defaults_without_variables() {
        let config = AppConfig::from_lookup(&lookup_from(&[]));
        assert_eq!(config.api.port(), 8080);
        assert!(config.api.uses_default_host());
        assert!(config.api.binds_to_all_interfaces());
        assert_eq!(config.engine.packing_config(), PackingConfig::default());
        assert_eq!(config.engine.max_split_boxes(), 50);
    }

    #[test]
    fn split_box_ceiling_is_read_and_validated() {
        let engine = AppConfig::from_lookup(&lookup_from(&[("CARTON_PACKER_MAX_SPLIT_BOXES", "8")])).engine;
        assert_eq!(engine.max_split_boxes(), 8);

        for raw in ["0", "-1", "many"] {
            let engine =
                AppConfig::from_lookup(&lookup_from(&[("CARTON_PACKER_MAX_SPLIT_BOXES", raw)])).engine;
            assert_eq!(engine.max_split_boxes(), EngineConfig::DEFAULT_MAX_SPLIT_BOXES);
        }
    }

    #[test]
    fn engine_values_are_read() {
        let lookup = lookup_from(&[
            ("CARTON_PACKER_PACKAGING_MULTIPLIER", "0.5"),
            ("CARTON_PACKER_BOX_PADDING", "2"),
            ("CARTON_PACKER_ALLOW_ORIENTATION_REUSE", "yes"),
            ("CARTON_PACKER_DEFAULT_GAP_XY", "1.5"),
            ("CARTON_PACKER_DEFAULT_MAX_STACK_LAYERS", "4"),
        ]);
        let packing = AppConfig::from_lookup(&lookup).engine.packing_config();
        assert_eq!(packing.packaging_multiplier, 0.5);
        assert_eq!(packing.box_padding, 2.0);
        assert!(packing.allow_orientation_reuse);
        assert_eq!(packing.defaults.gap_xy, 1.5);
        assert_eq!(packing.defaults.max_stack_layers, Some(4));
        assert_eq!(packing.defaults.side_margin, 0.0);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let lookup = lookup_from(&[
            ("CARTON_PACKER_API_HOST", "not-an-ip"),
            ("CARTON_PACKER_API_PORT", "0"),
            ("CARTON_PACKER_PACKAGING_MULTIPLIER", "-3"),
            ("CARTON_PACKER_BOX_PADDING", "NaN"),
            ("CARTON_PACKER_DEFAULT_MAX_STACK_LAYERS", "0"),
        ]);
        let config = AppConfig::from_lookup(&lookup);
        assert_eq!(config.api.display_host(), "0.0.0.0");
        assert_eq!(config.api.port(), 8080);
        let packing = config.engine.packing_config();
        assert_eq!(packing.packaging_multiplier, 0.01);
        assert_eq!(packing.box_padding, 0.0);
        assert_eq!(packing.defaults.max_stack_layers, None);
    }

    #[test]
    fn custom_host_and_port() {
        let lookup = lookup_from(&[
            ("CARTON_PACKER_API_HOST", "127.0.0.1"),
            ("CARTON_PACKER_API_PORT", "9000"),
        ]);
        let api = AppConfig::from_lookup(&lookup).api;
        assert_eq!(api.socket_addr().to_string(), "127.0.0.1:9000");
        assert!(!api.binds_to_all_interfaces());
    }
}
