use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tracing::{info, warn};

use crate::planner::PlannerConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub solver: SolverConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            solver: SolverConfig::from_env(),
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

    fn from_env() -> Self {
        let host_value =
            env_string("SPLIT_IT_NOW_API_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "Could not parse SPLIT_IT_NOW_API_HOST ('{}'): {}. Using {}.",
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match env_string("SPLIT_IT_NOW_API_PORT") {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    warn!(
                        "SPLIT_IT_NOW_API_PORT must not be 0. Using {}.",
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    warn!(
                        "Could not parse SPLIT_IT_NOW_API_PORT ('{}'): {}. Using {}.",
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

/// Configuration for candidate search and scoring.
#[derive(Clone, Debug, Default)]
pub struct SolverConfig {
    planner: PlannerConfig,
}

impl SolverConfig {
    const MAX_CANDIDATES_VAR: &'static str = "SPLIT_IT_NOW_SEARCH_MAX_CANDIDATES";
    const MAX_NODES_VAR: &'static str = "SPLIT_IT_NOW_SEARCH_MAX_NODES";
    const TIME_LIMIT_VAR: &'static str = "SPLIT_IT_NOW_SEARCH_TIME_LIMIT_MS";
    const PARALLEL_VAR: &'static str = "SPLIT_IT_NOW_SEARCH_PARALLEL";
    const PACKAGE_THRESHOLD_VAR: &'static str = "SPLIT_IT_NOW_SCORING_PACKAGE_THRESHOLD";

    fn from_env() -> Self {
        let max_candidates = optional_limit(
            Self::MAX_CANDIDATES_VAR,
            env_string(Self::MAX_CANDIDATES_VAR).as_deref(),
        )
        .map(|value| value as usize);
        let max_nodes = optional_limit(
            Self::MAX_NODES_VAR,
            env_string(Self::MAX_NODES_VAR).as_deref(),
        );
        let time_limit = optional_limit(
            Self::TIME_LIMIT_VAR,
            env_string(Self::TIME_LIMIT_VAR).as_deref(),
        )
        .map(Duration::from_millis);

        let parallel = env_string(Self::PARALLEL_VAR)
            .and_then(|raw| parse_bool(&raw, Self::PARALLEL_VAR))
            .unwrap_or(PlannerConfig::DEFAULT_PARALLEL);

        let package_threshold = parse_u64_with_warning(
            Self::PACKAGE_THRESHOLD_VAR,
            env_string(Self::PACKAGE_THRESHOLD_VAR).as_deref(),
            PlannerConfig::DEFAULT_PACKAGE_THRESHOLD as u64,
            |value| value > 0,
            "must be greater than 0",
            "Adjusted package threshold changes which candidate scores best",
        ) as usize;

        let planner = PlannerConfig::builder()
            .max_candidates(max_candidates)
            .max_nodes(max_nodes)
            .time_limit(time_limit)
            .parallel(parallel)
            .package_threshold(package_threshold)
            .build();

        Self { planner }
    }

    /// Returns the configured PlannerConfig.
    pub fn planner_config(&self) -> PlannerConfig {
        self.planner
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
            warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

/// Parses an optional positive budget; unset, zero or unparsable values mean "unbounded".
fn optional_limit(var_name: &str, raw: Option<&str>) -> Option<u64> {
    let raw = raw?;
    match raw.parse::<u64>() {
        Ok(0) => {
            warn!("{} must be greater than 0. Search stays unbounded.", var_name);
            None
        }
        Ok(value) => {
            info!("{} = {}", var_name, value);
            Some(value)
        }
        Err(err) => {
            warn!(
                "Could not parse {} ('{}') as number: {}. Search stays unbounded.",
                var_name, raw, err
            );
            None
        }
    }
}

fn parse_u64_with_warning(
    var_name: &str,
    raw: Option<&str>,
    default: u64,
    validator: impl Fn(u64) -> bool,
    invalid_hint: &str,
    notice: &str,
) -> u64 {
    match raw {
        Some(raw) => match raw.parse::<u64>() {
            Ok(value) => {
                if !validator(value) {
                    warn!(
                        "{} contains invalid value '{}': {}. Using {}.",
                        var_name, raw, invalid_hint, default
                    );
                    default
                } else {
                    if value != default {
                        info!("{} ({} = {}).", notice, var_name, value);
                    }
                    value
                }
            }
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_true_values() {
        assert_eq!(parse_bool("1", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("true", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("yes", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("y", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("on", "TEST_VAR"), Some(true));

        // Case and surrounding whitespace are ignored
        assert_eq!(parse_bool("TRUE", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool(" On ", "TEST_VAR"), Some(true));
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
    fn optional_limit_rejects_zero_and_garbage() {
        assert_eq!(optional_limit("TEST_VAR", None), None);
        assert_eq!(optional_limit("TEST_VAR", Some("0")), None);
        assert_eq!(optional_limit("TEST_VAR", Some("ten")), None);
        assert_eq!(optional_limit("TEST_VAR", Some("-5")), None);
        assert_eq!(optional_limit("TEST_VAR", Some("500")), Some(500));
    }

    #[test]
    fn threshold_falls_back_to_default() {
        let parse = |raw: Option<&'static str>| parse_u64_with_warning("TEST_VAR", raw, 10, |v| v > 0, "must be > 0", "");
        assert_eq!(parse(None), 10);
        assert_eq!(parse(Some("0")), 10);
        assert_eq!(parse(Some("x")), 10);
        assert_eq!(parse(Some("12")), 12);
    }

    #[test]
    fn solver_defaults_match_planner_defaults() {
        let solver = SolverConfig::default();
        assert_eq!(solver.planner_config(), PlannerConfig::default());
        assert!(solver.planner_config().parallel);
        assert_eq!(solver.planner_config().package_threshold, 10);
    }
}
