use std::env;

use anyhow::{Result, bail};

use crate::config::FavConfig;

/// The acting user for a request. A registered user has a positive id;
/// id 0 is the anonymous caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub id: i64,
    pub name: String,
}

impl UserContext {
    pub fn registered(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            id: 0,
            name: "Anonymous".to_string(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.id > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserOverrides {
    pub id: Option<i64>,
    pub name: Option<String>,
}

/// Resolve the acting user: flag > env (FAVTOOL_USER_ID / FAVTOOL_USER_NAME)
/// > config `[user]` > anonymous. A negative id is rejected outright.
pub fn resolve_user(config: &FavConfig, overrides: &UserOverrides) -> Result<UserContext> {
    resolve_user_with_lookup(config, overrides, |key| env::var(key).ok())
}

fn resolve_user_with_lookup<F>(
    config: &FavConfig,
    overrides: &UserOverrides,
    lookup_env: F,
) -> Result<UserContext>
where
    F: Fn(&str) -> Option<String>,
{
    let env_id = match lookup_env("FAVTOOL_USER_ID") {
        Some(value) if !value.trim().is_empty() => {
            let parsed = value.trim().parse::<i64>();
            match parsed {
                Ok(id) => Some(id),
                Err(_) => bail!("FAVTOOL_USER_ID is not a valid user id: {value}"),
            }
        }
        _ => None,
    };
    let env_name = lookup_env("FAVTOOL_USER_NAME")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let id = overrides.id.or(env_id).or(config.user.id).unwrap_or(0);
    if id < 0 {
        bail!("user id cannot be negative: {id}");
    }

    let name = overrides
        .name
        .clone()
        .or(env_name)
        .or_else(|| config.user.name.clone());

    Ok(match name {
        Some(name) if id > 0 => UserContext::registered(id, name),
        None if id > 0 => UserContext::registered(id, format!("User:{id}")),
        _ => UserContext::anonymous(),
    })
}
