/// Environment and connection establishment
///
/// The environment owns the driver entry point and the login timeout, and
/// validates connection parameters before anything touches the network.
/// Connection strings are semicolon-separated `name=value` pairs; the
/// characters `[]{}(),;?*=!@\` cannot appear in a name or a value, since
/// the driver manager's grammar reserves them.
use std::sync::Mutex;
use std::time::Duration;

use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::{check, safe_lock, Error, Result};

/// Characters reserved by the connection-string grammar.
const RESERVED: &[u8] = br"[]{}(),;?*=!@\";

/// Entry point: wraps a [`Driver`] and mints connections.
pub struct Environment {
    driver: Box<dyn Driver>,
    login_timeout: Mutex<Option<Duration>>,
}

impl Environment {
    pub fn new(driver: Box<dyn Driver>) -> Self {
        Environment {
            driver,
            login_timeout: Mutex::new(None),
        }
    }

    /// Timeout for the connect phase only. There is no per-statement
    /// timeout anywhere in this engine.
    pub fn set_login_timeout(&self, timeout: Duration) -> Result<()> {
        *safe_lock(&self.login_timeout, "set_login_timeout")? = Some(timeout);
        Ok(())
    }

    pub fn clear_login_timeout(&self) -> Result<()> {
        *safe_lock(&self.login_timeout, "clear_login_timeout")? = None;
        Ok(())
    }

    /// Connect with a raw connection string. Returns the connection and
    /// the completed connection string the driver reports back.
    pub fn connect(&self, connection_string: &str) -> Result<(Connection, String)> {
        let timeout = *safe_lock(&self.login_timeout, "connect")?;
        let (conn, out) = check(
            self.driver.connect(connection_string, timeout),
            &*self.driver,
            "connect",
        )?
        .data("connect")?;
        Ok((Connection::new(conn), out))
    }

    /// Connect with explicit parameters, validated and joined into
    /// `name=value;…` form.
    pub fn connect_with(&self, params: &[(&str, &str)]) -> Result<(Connection, String)> {
        let mut s = String::new();
        for (name, value) in params {
            validate_param(name)?;
            validate_param(value)?;
            s.push_str(name);
            s.push('=');
            s.push_str(value);
            s.push(';');
        }
        self.connect(&s)
    }
}

/// Reject names and values containing grammar-reserved characters. This
/// runs before any I/O.
pub(crate) fn validate_param(s: &str) -> Result<()> {
    if s.bytes().any(|b| RESERVED.contains(&b)) {
        return Err(Error::InvalidConnectionParameter {
            name: s.to_string(),
        });
    }
    Ok(())
}
