use anyhow::{bail, Context, Result};
use cakeday_core::ReminderPolicy;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::state::ensure_cakeday_home;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub contacts: ContactsSection,
    pub reminders: RemindersSection,
    pub outreach: OutreachSection,
    pub llm: LlmSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactsSection {
    /// vCard (.vcf) or CSV export to read the roster from.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindersSection {
    pub fire_hour: u32,
    pub fire_minute: u32,
    pub catch_up_delay_secs: u32,
    /// Where `reminders sync` writes the calendar (default ~/.cakeday/birthdays.ics).
    pub ics_path: Option<PathBuf>,
    /// IANA zone, e.g. "America/Chicago". Local system time when unset.
    pub timezone: Option<String>,
}

impl Default for RemindersSection {
    fn default() -> Self {
        let policy = ReminderPolicy::default();
        Self {
            fire_hour: policy.fire_hour,
            fire_minute: policy.fire_minute,
            catch_up_delay_secs: policy.catch_up_delay_secs,
            ics_path: None,
            timezone: None,
        }
    }
}

impl RemindersSection {
    pub fn policy(&self) -> Result<ReminderPolicy> {
        if self.fire_hour > 23 || self.fire_minute > 59 {
            bail!(
                "invalid reminder time {:02}:{:02} in [reminders]",
                self.fire_hour,
                self.fire_minute
            );
        }
        Ok(ReminderPolicy {
            fire_hour: self.fire_hour,
            fire_minute: self.fire_minute,
            catch_up_delay_secs: self.catch_up_delay_secs,
        })
    }

    pub fn tz(&self) -> Result<Option<Tz>> {
        match self.timezone.as_deref() {
            None => Ok(None),
            Some(name) => name
                .parse::<Tz>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("invalid [reminders].timezone {name:?}: {e}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Console,
    Imessage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutreachSection {
    pub transport: TransportKind,
    /// Extra note passed to the composer when `send` gets no --hint.
    pub default_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    None,
    Openai,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: ProviderKind::None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_cakeday_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    parse_config(&s)
}

pub fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config.toml")
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn show_config() -> Result<()> {
    let cfg = load_config()?;
    println!("# {}", config_path()?.display());
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}
