use anyhow::{Result, bail};
use std::{env, path::PathBuf};

#[derive(Clone)]
pub struct Paths {
    pub config: PathBuf,
}

/// `$XDG_CONFIG_HOME/section`, falling back to `$HOME/.config/section`.
pub fn section_home() -> Result<PathBuf> {
    let base = match (env::var_os("XDG_CONFIG_HOME"), env::var_os("HOME")) {
        (Some(xdg), _) if !xdg.is_empty() => PathBuf::from(xdg),
        (_, Some(home)) if !home.is_empty() => PathBuf::from(home).join(".config"),
        _ => bail!("cannot locate config directory: neither XDG_CONFIG_HOME nor HOME is set"),
    };
    Ok(base.join("section"))
}

pub fn paths() -> Result<Paths> {
    let home = section_home()?;
    Ok(Paths {
        config: home.join("config.toml"),
    })
}
