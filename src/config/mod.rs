use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::env;

/// Harness configuration. Inside a real host engine these values arrive as
/// per-operator constructor arguments; the offline harness reads them from
/// the environment once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub min_link_weight: f32,
    pub num_recs: usize,
    pub diversity_adjust: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            min_link_weight: parse_var("MIN_LINK_WEIGHT", "0.0")?,
            num_recs: parse_var("NUM_RECS", "10")?,
            diversity_adjust: parse_var("DIVERSITY_ADJUST", "true")?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| PipelineError::Config(format!("{} could not be parsed", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_default() {
        let value: f32 = parse_var("RECSYS_CORE_UNSET_VAR", "2.5").unwrap();
        assert_eq!(value, 2.5);
    }

    #[test]
    fn test_parse_var_reports_config_error() {
        let result: Result<usize> = parse_var("RECSYS_CORE_UNSET_VAR", "-3");
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
