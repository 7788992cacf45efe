//! Connection string parsing and password substitution.
//!
//! Two formats are accepted: URLs with a `postgres://` or `postgresql://` prefix,
//! and libpq keyword/value strings (`host=db user=app sslmode=require`).

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use url::Url;

use crate::{Error, Result};

const URL_PREFIXES: [&str; 2] = ["postgres://", "postgresql://"];

/// Whether `conn_string` uses the URL form.
pub fn is_url(conn_string: &str) -> bool {
    URL_PREFIXES
        .iter()
        .any(|prefix| conn_string.starts_with(prefix))
}

/// Return `conn_string` with its password replaced by `password`.
///
/// A missing password is added. URLs are rebuilt with query-escaped credentials;
/// keyword/value strings get a single-quoted `password='...'` entry.
///
/// ```
/// use pg_iam_auth::substitute_password;
///
/// let url = substitute_password("postgres://app:old@db:5432/app", "new pass").unwrap();
/// assert_eq!(url, "postgres://app:new+pass@db:5432/app");
///
/// let dsn = substitute_password("host=db user=app", "it's").unwrap();
/// assert_eq!(dsn, "host=db user=app password='it''s'");
/// ```
pub fn substitute_password(conn_string: &str, password: &str) -> Result<String> {
    substitute_credentials(conn_string, None, password)
}

/// Like [`substitute_password`], also replacing the user when `username` is set.
pub fn substitute_credentials(
    conn_string: &str,
    username: Option<&str>,
    password: &str,
) -> Result<String> {
    if is_url(conn_string) {
        substitute_in_url(conn_string, username, password).map_err(|e| {
            Error::connection_string(format!(
                "preparing database connection url with auth token: {}",
                e
            ))
        })
    } else {
        Ok(substitute_in_dsn(conn_string, username, password))
    }
}

fn substitute_in_url(
    database_url: &str,
    username: Option<&str>,
    password: &str,
) -> std::result::Result<String, String> {
    let url = Url::parse(database_url)
        .map_err(|e| format!("failed to parse connection URL: {}", e))?;

    let username = match username {
        Some(username) => username.to_string(),
        None => urlencoding::decode(url.username())
            .map_err(|e| format!("invalid username encoding: {}", e))?
            .into_owned(),
    };

    let mut host = url.host_str().unwrap_or_default().to_string();
    if let Some(port) = url.port() {
        host.push(':');
        host.push_str(&port.to_string());
    }

    let mut rebuilt = format!(
        "{}://{}:{}@{}{}",
        url.scheme(),
        query_escape(&username),
        query_escape(password),
        host,
        url.path()
    );

    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        rebuilt.push('?');
        rebuilt.push_str(query);
    }
    if let Some(fragment) = url.fragment().filter(|f| !f.is_empty()) {
        rebuilt.push('#');
        rebuilt.push_str(fragment);
    }

    Ok(rebuilt)
}

fn substitute_in_dsn(dsn: &str, username: Option<&str>, password: &str) -> String {
    let password_entry = format!("password={}", quote_dsn_value(password));
    let user_entry = username.map(|u| format!("user={}", quote_dsn_value(u)));

    let mut password_found = false;
    let mut user_found = false;
    let mut parts: Vec<String> = dsn
        .split(' ')
        .map(|part| {
            if part.starts_with("password=") {
                password_found = true;
                password_entry.clone()
            } else if let Some(ref user_entry) = user_entry
                && part.starts_with("user=")
            {
                user_found = true;
                user_entry.clone()
            } else {
                part.to_string()
            }
        })
        .collect();

    if let Some(user_entry) = user_entry
        && !user_found
    {
        parts.push(user_entry);
    }
    if !password_found {
        parts.push(password_entry);
    }

    parts.join(" ")
}

fn quote_dsn_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Form-style escaping: unreserved characters pass through, space becomes `+`.
pub fn query_escape(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

/// Split a keyword/value connection string into pairs.
///
/// Values may be single-quoted; inside quotes `\'`, `\\` and `''` are escapes.
pub fn parse_dsn(dsn: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = dsn.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(Error::connection_string(format!(
                "missing \"=\" after \"{}\" in connection info string",
                key
            )));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => break,
                    },
                    Some('\'') => {
                        if chars.next_if_eq(&'\'').is_some() {
                            value.push('\'');
                        } else {
                            break;
                        }
                    }
                    Some(c) => value.push(c),
                    None => {
                        return Err(Error::connection_string(
                            "unterminated quoted string in connection info string",
                        ));
                    }
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        value.push(escaped);
                    }
                } else {
                    value.push(c);
                }
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}

/// Parse either connection string format into sqlx connect options.
pub fn parse_connect_options(conn_string: &str) -> Result<PgConnectOptions> {
    if is_url(conn_string) {
        return PgConnectOptions::from_str(conn_string)
            .map_err(|e| Error::connection_string(format!("failed to parse connection URL: {}", e)));
    }

    let mut options = PgConnectOptions::new();
    for (key, value) in parse_dsn(conn_string)? {
        options = match key.as_str() {
            "host" if value.starts_with('/') => options.socket(&value),
            "host" | "hostaddr" => options.host(&value),
            "port" => options.port(value.parse().map_err(|_| {
                Error::connection_string(format!("invalid port: {}", value))
            })?),
            "user" => options.username(&value),
            "password" => options.password(&value),
            "dbname" => options.database(&value),
            "sslmode" => options.ssl_mode(PgSslMode::from_str(&value).map_err(|_| {
                Error::connection_string(format!("invalid sslmode: {}", value))
            })?),
            "sslrootcert" => options.ssl_root_cert(&value),
            "sslcert" => options.ssl_client_cert(&value),
            "sslkey" => options.ssl_client_key(&value),
            "application_name" => options.application_name(&value),
            _ => {
                tracing::debug!(key = %key, "ignoring unsupported connection parameter");
                options
            }
        };
    }

    Ok(options)
}
