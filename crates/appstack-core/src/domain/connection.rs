//! SQL connection descriptor.

use std::fmt;

use super::secret::Secret;

/// Connection pool bounds written into the connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolBounds {
    pub min: u32,
    pub max: u32,
}

impl Default for PoolBounds {
    fn default() -> Self {
        Self { min: 0, max: 30 }
    }
}

/// Connection details for an Azure SQL database.
///
/// Only built once the server and database names are known; immutable
/// afterwards. Holds the admin password in plaintext, so `Debug` hides it.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    server_name: String,
    database_name: String,
    login: String,
    password: Secret,
    pool: PoolBounds,
}

impl ConnectionDescriptor {
    pub fn new(
        server_name: impl Into<String>,
        database_name: impl Into<String>,
        login: impl Into<String>,
        password: Secret,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            database_name: database_name.into(),
            login: login.into(),
            password,
            pool: PoolBounds::default(),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn pool(&self) -> PoolBounds {
        self.pool
    }

    /// ADO.NET-style connection string understood by App Service.
    pub fn connection_string(&self) -> String {
        format!(
            "Server=tcp:{}.database.windows.net;initial catalog={};user ID={};password={};Min Pool Size={};Max Pool Size={};Persist Security Info=true;",
            self.server_name,
            self.database_name,
            self.login,
            self.password.expose(),
            self.pool.min,
            self.pool.max,
        )
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("server_name", &self.server_name)
            .field("database_name", &self.database_name)
            .field("login", &self.login)
            .field("password", &self.password)
            .field("pool", &self.pool)
            .finish()
    }
}
