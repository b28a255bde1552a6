use serde::{Deserialize, Serialize};

use crate::{
    embedding::DEFAULT_DIMENSION,
    error::{Error, Result},
    eval::{DEFAULT_NEL, DEFAULT_WEL, Limits},
    semantic::{DEFAULT_K, DEFAULT_MAX_DISTANCE},
};

pub const WEL_ENV: &str = "SIEVE_WEL";
pub const NEL_ENV: &str = "SIEVE_NEL";
pub const HYBRID_ENV: &str = "SIEVE_HYBRID";

/// Engine settings.
///
/// Layered lowest to highest: built-in defaults, the values persisted with
/// the index at build time, environment variables, then command-line
/// [`Overrides`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default wildcard expansion limit.
    pub wel: usize,
    /// Negation expansion limit.
    pub nel: usize,
    /// Neighbors requested per semantic term.
    pub k: usize,
    /// Largest accepted semantic distance.
    pub max_distance: f32,
    /// Resolve free-text terms by nearest-neighbor search.
    pub hybrid: bool,
    pub embedding_dim: usize,
    /// Top-level field holding explicit record ids.
    pub id_field: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wel: DEFAULT_WEL,
            nel: DEFAULT_NEL,
            k: DEFAULT_K,
            max_distance: DEFAULT_MAX_DISTANCE,
            hybrid: false,
            embedding_dim: DEFAULT_DIMENSION,
            id_field: None,
        }
    }
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub wel: Option<usize>,
    pub nel: Option<usize>,
    pub hybrid: Option<bool>,
    pub id_field: Option<String>,
}

impl Settings {
    pub fn limits(&self) -> Limits {
        Limits {
            wel: self.wel,
            nel: self.nel,
        }
    }

    /// Apply `SIEVE_WEL`, `SIEVE_NEL` and `SIEVE_HYBRID` from the process
    /// environment.
    pub fn with_env(self) -> Result<Self> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    pub fn with_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(value) = lookup(WEL_ENV) {
            self.wel = parse_env(WEL_ENV, &value)?;
        }
        if let Some(value) = lookup(NEL_ENV) {
            self.nel = parse_env(NEL_ENV, &value)?;
        }
        if let Some(value) = lookup(HYBRID_ENV) {
            self.hybrid = parse_flag(HYBRID_ENV, &value)?;
        }
        Ok(self)
    }

    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(wel) = overrides.wel {
            self.wel = wel;
        }
        if let Some(nel) = overrides.nel {
            self.nel = nel;
        }
        if let Some(hybrid) = overrides.hybrid {
            self.hybrid = hybrid;
        }
        if let Some(id_field) = &overrides.id_field {
            self.id_field = Some(id_field.clone());
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("wel", self.wel),
            ("nel", self.nel),
            ("k", self.k),
            ("embedding_dim", self.embedding_dim),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }
        if self.max_distance.is_nan() || self.max_distance < 0.0 {
            return Err(Error::Config(format!(
                "max_distance must be a non-negative number, got {}",
                self.max_distance
            )));
        }
        Ok(())
    }
}

fn parse_env(key: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!("{key} must be a non-negative integer, got '{value}'"))
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!("{key} must be a boolean, got '{value}'"))),
    }
}
