//! Physical datasource identifier.
use std::fmt::Display;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{Config, Role};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DbIndex {
    name: Arc<str>,
    role: Role,
}

impl DbIndex {
    pub fn new(name: &str, role: Role) -> Self {
        Self {
            name: Arc::from(name),
            role,
        }
    }

    /// Write datasource.
    pub fn write(name: &str) -> Self {
        Self::new(name, Role::Write)
    }

    /// Read datasource.
    pub fn read(name: &str) -> Self {
        Self::new(name, Role::Read)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_read(&self) -> bool {
        self.role == Role::Read
    }

    /// All configured datasources.
    pub fn from_config(config: &Config) -> Vec<Self> {
        config
            .datasources
            .iter()
            .map(|datasource| Self::new(&datasource.name, datasource.role))
            .collect()
    }
}

impl Display for DbIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.name, self.role)
    }
}
