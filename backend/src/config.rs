use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use shared::prize_table::{PrizeSegment, PrizeTable, PrizeTableError};
use shared::shared_wheel_game::{SpinConfig, MIN_REVOLUTIONS, SETTLE_DELAY_MS, SPIN_DURATION_MS};
use tracing::{info, warn};

use crate::services::conversions_service::MetaConfig;
use crate::services::sheets_service::SheetsConfig;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://127.0.0.1:3000,http://localhost:3000";

#[derive(Debug)]
pub enum ConfigError {
    InvalidBindAddr(String),
    PrizeTableFile(std::io::Error),
    PrizeTableJson(serde_json::Error),
    PrizeTable(PrizeTableError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBindAddr(addr) => write!(f, "BIND_ADDR is not a socket address: {}", addr),
            Self::PrizeTableFile(e) => write!(f, "Could not read prize table: {}", e),
            Self::PrizeTableJson(e) => write!(f, "Prize table is not valid JSON: {}", e),
            Self::PrizeTable(e) => write!(f, "Invalid prize table: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub allowed_origins: Vec<String>,
    pub spin: SpinConfig,
    pub prize_table: PrizeTable,
    pub sheets: Option<SheetsConfig>,
    pub meta: Option<MetaConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_addr.clone()))?;

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        let spin = SpinConfig {
            min_revolutions: parse_or(&lookup, "MIN_REVOLUTIONS", MIN_REVOLUTIONS),
            spin_duration: Duration::from_millis(parse_or(&lookup, "SPIN_DURATION_MS", SPIN_DURATION_MS)),
            settle_delay: Duration::from_millis(parse_or(&lookup, "SETTLE_DELAY_MS", SETTLE_DELAY_MS)),
        };

        let prize_table = match lookup("PRIZE_TABLE_PATH") {
            Some(path) => {
                let contents = std::fs::read_to_string(&path).map_err(ConfigError::PrizeTableFile)?;
                let table = prize_table_from_json(&contents)?;
                info!("Loaded {} prize segments from {}", table.segments().len(), path);
                table
            }
            None => PrizeTable::default(),
        };

        let sheets = SheetsConfig::from_lookup(&lookup).ok();
        if sheets.is_none() {
            warn!("Google Sheets is not configured, email submissions will fail");
        }
        let meta = MetaConfig::from_lookup(&lookup).ok();
        if meta.is_none() {
            warn!("Meta Pixel ID or Access Token not configured, conversion tracking disabled");
        }

        Ok(Self {
            bind_addr,
            allowed_origins,
            spin,
            prize_table,
            sheets,
            meta,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value {:?}, using {}", name, raw, default);
            default
        }),
        None => default,
    }
}

pub fn prize_table_from_json(contents: &str) -> Result<PrizeTable, ConfigError> {
    let segments: Vec<PrizeSegment> = serde_json::from_str(contents).map_err(ConfigError::PrizeTableJson)?;
    PrizeTable::new(segments).map_err(ConfigError::PrizeTable)
}

/// Which sink credentials are present, without exposing any of them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvReport {
    pub status: &'static str,
    pub has_google_sheets_id: bool,
    pub has_google_project_id: bool,
    pub has_google_private_key_id: bool,
    pub has_google_private_key: bool,
    pub has_google_client_email: bool,
    pub has_google_client_id: bool,
    pub has_meta_pixel_id: bool,
    pub has_meta_access_token: bool,
    pub sheets_id_length: usize,
    pub project_id_preview: String,
    pub client_email_preview: String,
}

impl EnvReport {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).map_or(false, |v| !v.is_empty());
        let preview = |name: &str, len: usize| match lookup(name).filter(|v| !v.is_empty()) {
            Some(value) => format!("{}...", value.chars().take(len).collect::<String>()),
            None => "missing".to_string(),
        };

        Self {
            status: "Environment check",
            has_google_sheets_id: present("GOOGLE_SHEETS_ID"),
            has_google_project_id: present("GOOGLE_PROJECT_ID"),
            has_google_private_key_id: present("GOOGLE_PRIVATE_KEY_ID"),
            has_google_private_key: present("GOOGLE_PRIVATE_KEY") || present("GOOGLE_PRIVATE_KEY_BASE64"),
            has_google_client_email: present("GOOGLE_CLIENT_EMAIL"),
            has_google_client_id: present("GOOGLE_CLIENT_ID"),
            has_meta_pixel_id: present("META_PIXEL_ID"),
            has_meta_access_token: present("META_ACCESS_TOKEN"),
            sheets_id_length: lookup("GOOGLE_SHEETS_ID").map_or(0, |v| v.chars().count()),
            project_id_preview: preview("GOOGLE_PROJECT_ID", 10),
            client_email_preview: preview("GOOGLE_CLIENT_EMAIL", 20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(vars: &'a HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| vars.get(name).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let vars = HashMap::new();
        let config = AppConfig::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.allowed_origins, vec!["http://127.0.0.1:3000", "http://localhost:3000"]);
        assert_eq!(config.spin, SpinConfig::default());
        assert_eq!(config.prize_table, PrizeTable::default());
        assert!(config.sheets.is_none());
        assert!(config.meta.is_none());
    }

    #[test]
    fn test_spin_tuning_overrides() {
        let vars = HashMap::from([
            ("MIN_REVOLUTIONS", "8"),
            ("SPIN_DURATION_MS", "3000"),
            ("SETTLE_DELAY_MS", "not a number"),
            ("ALLOWED_ORIGINS", "https://promo.example.com, "),
        ]);
        let config = AppConfig::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(config.spin.min_revolutions, 8);
        assert_eq!(config.spin.spin_duration, Duration::from_millis(3000));
        assert_eq!(config.spin.settle_delay, Duration::from_millis(SETTLE_DELAY_MS));
        assert_eq!(config.allowed_origins, vec!["https://promo.example.com"]);
    }

    #[test]
    fn test_bad_bind_addr() {
        let vars = HashMap::from([("BIND_ADDR", "localhost")]);
        assert!(matches!(
            AppConfig::from_lookup(lookup_from(&vars)),
            Err(ConfigError::InvalidBindAddr(_))
        ));
    }

    #[test]
    fn test_prize_table_json() {
        let table = prize_table_from_json(
            r#"[{"min_degree": 0, "max_degree": 90, "amount": 1000},
                {"min_degree": 90, "max_degree": 360, "amount": 10}]"#,
        )
        .unwrap();
        assert_eq!(table.list_prize_amounts(), vec![1000, 10]);

        assert!(matches!(
            prize_table_from_json(r#"[{"min_degree": 0, "max_degree": 90, "amount": 1000}]"#),
            Err(ConfigError::PrizeTable(PrizeTableError::Gap { .. }))
        ));
        assert!(matches!(prize_table_from_json("{"), Err(ConfigError::PrizeTableJson(_))));
    }

    #[test]
    fn test_env_report_hides_secrets() {
        let vars = HashMap::from([
            ("GOOGLE_SHEETS_ID", "1AbCdEfGhIjK"),
            ("GOOGLE_PROJECT_ID", "wtf-games-promo-prod"),
            ("GOOGLE_PRIVATE_KEY_BASE64", "c2VjcmV0"),
            ("META_ACCESS_TOKEN", "EAAB-secret"),
        ]);
        let report = EnvReport::from_lookup(lookup_from(&vars));
        assert!(report.has_google_sheets_id);
        assert!(report.has_google_private_key);
        assert!(!report.has_google_client_email);
        assert!(report.has_meta_access_token);
        assert!(!report.has_meta_pixel_id);
        assert_eq!(report.sheets_id_length, 12);
        assert_eq!(report.project_id_preview, "wtf-games-...");
        assert_eq!(report.client_email_preview, "missing");

        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("EAAB-secret"));
        assert!(json.contains("\"hasGoogleSheetsId\":true"));
    }
}
