//! Connection options.

use chrono::FixedOffset;
use url::Url;

use crate::error::{Error, Result};

/// Login name of the current OS user, used when no user is given.
fn os_login() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_default()
}

/// Connection options shared by [`Conn`](crate::sync::Conn) and
/// [`Pool`](crate::sync::Pool).
#[derive(Debug, Clone)]
pub struct Opts {
    /// Name of the registered driver (e.g. `"postgresql"`, `"mysql"`).
    ///
    /// Required.
    pub driver: String,

    /// Database name.
    ///
    /// Required.
    pub database: String,

    /// Hostname or IP address. An empty host lets the driver pick its default
    /// (usually a local socket).
    ///
    /// Default: `""`
    pub host: String,

    /// Port number.
    ///
    /// Default: `None` (driver default)
    pub port: Option<u16>,

    /// Username for authentication.
    ///
    /// Default: the current OS login (`$USER`, then `$LOGNAME`)
    pub user: String,

    /// Password for authentication.
    ///
    /// Default: `None`
    pub password: Option<String>,

    /// UTC offset used to interpret zone-less timestamps.
    ///
    /// Default: `None` (the process's local offset)
    pub timezone: Option<FixedOffset>,

    /// Additional driver-specific parameters.
    ///
    /// Default: `[]`
    pub params: Vec<(String, String)>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            driver: String::new(),
            database: String::new(),
            host: String::new(),
            port: None,
            user: os_login(),
            password: None,
            timezone: None,
            params: Vec::new(),
        }
    }
}

impl Opts {
    /// Check the required options. Called before any driver is contacted.
    pub fn validate(&self) -> Result<()> {
        if self.driver.is_empty() {
            return Err(Error::InvalidUsage("options are missing a driver".into()));
        }
        if self.database.is_empty() {
            return Err(Error::InvalidUsage("options are missing a database".into()));
        }
        Ok(())
    }

    /// Look up a driver-specific parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse `+HH:MM`, `-HHMM` or `+HH` into an offset.
fn parse_timezone(value: &str) -> Option<FixedOffset> {
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => (1, value),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a connection URL.
    ///
    /// Format: `driver://[user[:password]@][host][:port]/database[?param1=value1&..]`
    ///
    /// The scheme names the driver. Supported query parameters:
    /// - `timezone`: offset for zone-less timestamps (`+09:00`, `-0500`, `+01`)
    ///
    /// Other parameters are passed through to the driver in `params`.
    fn try_from(url: &Url) -> Result<Self> {
        let mut opts = Opts {
            driver: url.scheme().to_string(),
            host: url.host_str().unwrap_or("").to_string(),
            port: url.port(),
            database: url.path().trim_start_matches('/').to_string(),
            password: url.password().map(|s| s.to_string()),
            ..Opts::default()
        };
        if !url.username().is_empty() {
            opts.user = url.username().to_string();
        }

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "timezone" => {
                    opts.timezone = Some(parse_timezone(&value).ok_or_else(|| {
                        Error::InvalidUsage(format!("Invalid timezone: {}", value))
                    })?);
                }
                _ => {
                    opts.params.push((key.to_string(), value.to_string()));
                }
            }
        }

        opts.validate()?;
        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}
