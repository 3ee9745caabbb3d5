//! Relay credentials, read once from the environment at startup.

use courier_delivery::Credentials;

pub const USERNAME_VAR: &str = "SMTP_USERNAME";
pub const PASSWORD_VAR: &str = "SMTP_PASSWORD";

/// Reads [`USERNAME_VAR`] and [`PASSWORD_VAR`].
///
/// # Errors
///
/// Fails if either variable is unset or blank.
pub fn from_env() -> anyhow::Result<Credentials> {
    from_lookup(|name| std::env::var(name).ok())
}

fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Credentials> {
    let username = lookup(USERNAME_VAR)
        .map(|username| username.trim().to_string())
        .filter(|username| !username.is_empty())
        .ok_or_else(|| anyhow::anyhow!("{USERNAME_VAR} must be set to the relay account"))?;

    // App passwords are usually shown in space separated groups.
    let secret: String = lookup(PASSWORD_VAR)
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if secret.is_empty() {
        anyhow::bail!("{PASSWORD_VAR} must be set to the relay password");
    }

    Ok(Credentials::new(username, secret))
}
