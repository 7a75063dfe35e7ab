//! Integrator configuration.
//!
//! The file is TOML with one table per collaborator. Required sections and
//! keys are checked by name before deserializing, so a broken file fails with
//! a message pointing at the missing `[section]` or key, and always before any
//! request is made. Secrets can come from the environment (or a `.env` file)
//! instead of the file; environment values win.

use crate::common::constants::{
    column_list, DEFAULT_BACKOFF_MS, DEFAULT_COUNTRY_CODE, DEFAULT_CSV_DELIMITER,
    DEFAULT_DATE_COLUMNS, DEFAULT_DROP_COLUMNS, DEFAULT_DURATION_COLUMNS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_PERCENTAGE_COLUMNS, DEFAULT_PHONE_COLUMNS, DEFAULT_TIMEOUT_SECS,
};
use crate::common::error::{IntegratorError, Result};
use crate::common::retry::RetryPolicy;
use crate::common::types::Tenancy;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use toml::{Table, Value};

pub const IPED_SECTION: &str = "iped";
pub const SALESFORCE_SECTION: &str = "salesforce";
pub const EXPORT_SECTION: &str = "export";

pub const IPED_REQUIRED_FIELDS: &[&str] = &[
    "token_home",
    "token_branch",
    "base_url",
    "users_endpoint",
    "user_profile_endpoint",
    "trails_endpoint",
    "all_courses_endpoint",
    "finished_courses_endpoint",
    "inprogress_courses_endpoint",
    "course_summary_endpoint",
];

pub const SALESFORCE_REQUIRED_FIELDS: &[&str] =
    &["client_id", "client_secret", "base_url", "dataevents_endpoint"];

pub const EXPORT_REQUIRED_FIELDS: &[&str] = &["url", "key_column"];

/// Environment variables that override file values: (variable, section, key).
const ENV_OVERRIDES: &[(&str, &str, &str)] = &[
    ("IPED_TOKEN_HOME", IPED_SECTION, "token_home"),
    ("IPED_TOKEN_BRANCH", IPED_SECTION, "token_branch"),
    ("SALESFORCE_CLIENT_ID", SALESFORCE_SECTION, "client_id"),
    ("SALESFORCE_CLIENT_SECRET", SALESFORCE_SECTION, "client_secret"),
];

#[derive(Debug, Clone)]
pub struct Config {
    pub iped: IpedConfig,
    pub salesforce: SalesforceConfig,
    pub http: HttpConfig,
    pub export: Option<ExportConfig>,
    pub transform: TransformConfig,
}

/// Resolved IPED endpoints and tenancy tokens.
#[derive(Debug, Clone)]
pub struct IpedConfig {
    pub token_home: String,
    pub token_branch: String,
    pub users_url: String,
    pub user_profile_url: String,
    pub trails_url: String,
    pub all_courses_url: String,
    pub finished_courses_url: String,
    pub inprogress_courses_url: String,
    pub course_summary_url: String,
    pub requests_per_min: Option<u64>,
}

impl IpedConfig {
    pub fn token(&self, tenancy: Tenancy) -> &str {
        match tenancy {
            Tenancy::Home => &self.token_home,
            Tenancy::Branch => &self.token_branch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SalesforceConfig {
    pub client_id: String,
    pub client_secret: String,
    pub dataevents_url: String,
    pub auth_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub url: String,
    /// Column whose value identifies a row in the Salesforce data extension.
    pub key_column: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    DEFAULT_CSV_DELIMITER
}

/// What the table transformer does when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the whole transform on the first failing stage.
    #[default]
    FailFast,
    /// Leave the failing column as it was, report the error and keep going.
    /// The output can then hold unconverted values in that column.
    BestEffort,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub policy: FailurePolicy,
    pub drop_columns: Vec<String>,
    pub date_columns: Vec<String>,
    pub phone_columns: Vec<String>,
    pub percentage_columns: Vec<String>,
    pub duration_columns: Vec<String>,
    pub country_code: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::default(),
            drop_columns: column_list(DEFAULT_DROP_COLUMNS),
            date_columns: column_list(DEFAULT_DATE_COLUMNS),
            phone_columns: column_list(DEFAULT_PHONE_COLUMNS),
            percentage_columns: column_list(DEFAULT_PERCENTAGE_COLUMNS),
            duration_columns: column_list(DEFAULT_DURATION_COLUMNS),
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
        }
    }
}

// Shapes of the file sections before URL resolution
#[derive(Debug, Deserialize)]
struct RawIped {
    token_home: String,
    token_branch: String,
    base_url: String,
    users_endpoint: String,
    user_profile_endpoint: String,
    trails_endpoint: String,
    all_courses_endpoint: String,
    finished_courses_endpoint: String,
    inprogress_courses_endpoint: String,
    course_summary_endpoint: String,
    #[serde(default)]
    requests_per_min: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawSalesforce {
    client_id: String,
    client_secret: String,
    base_url: String,
    dataevents_endpoint: String,
    #[serde(default)]
    auth_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    iped: RawIped,
    salesforce: RawSalesforce,
    #[serde(default)]
    http: HttpConfig,
    #[serde(default)]
    export: Option<ExportConfig>,
    #[serde(default)]
    transform: TransformConfig,
}

impl Config {
    /// Load the configuration file, applying `.env` and environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        dotenv::dotenv().ok();
        let content = fs::read_to_string(path).map_err(|e| {
            IntegratorError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content, |name| std::env::var(name).ok())
    }

    /// Parse configuration text. `env` looks up override variables.
    pub fn from_toml_str(content: &str, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut table: Table = content.parse()?;
        apply_env_overrides(&mut table, &env);

        validate_required_fields(&table, IPED_SECTION, IPED_REQUIRED_FIELDS)?;
        validate_required_fields(&table, SALESFORCE_SECTION, SALESFORCE_REQUIRED_FIELDS)?;
        if table.contains_key(EXPORT_SECTION) {
            validate_required_fields(&table, EXPORT_SECTION, EXPORT_REQUIRED_FIELDS)?;
        }

        let raw: RawConfig = Value::Table(table).try_into()?;
        Self::resolve(raw)
    }

    fn resolve(raw: RawConfig) -> Result<Self> {
        let iped = &raw.iped;
        let iped_config = IpedConfig {
            token_home: iped.token_home.clone(),
            token_branch: iped.token_branch.clone(),
            users_url: join_url(&iped.base_url, &iped.users_endpoint)?,
            user_profile_url: join_url(&iped.base_url, &iped.user_profile_endpoint)?,
            trails_url: join_url(&iped.base_url, &iped.trails_endpoint)?,
            all_courses_url: join_url(&iped.base_url, &iped.all_courses_endpoint)?,
            finished_courses_url: join_url(&iped.base_url, &iped.finished_courses_endpoint)?,
            inprogress_courses_url: join_url(&iped.base_url, &iped.inprogress_courses_endpoint)?,
            course_summary_url: join_url(&iped.base_url, &iped.course_summary_endpoint)?,
            requests_per_min: iped.requests_per_min,
        };

        let sf = &raw.salesforce;
        let auth_url = match &sf.auth_url {
            Some(url) => join_url(url, "")?,
            None => join_url(&sf.base_url, "/v2/token")?,
        };
        let salesforce_config = SalesforceConfig {
            client_id: sf.client_id.clone(),
            client_secret: sf.client_secret.clone(),
            dataevents_url: join_url(&sf.base_url, &sf.dataevents_endpoint)?,
            auth_url,
        };

        if let Some(export) = &raw.export {
            join_url(&export.url, "")?;
        }
        if raw.http.timeout_secs == 0 {
            return Err(IntegratorError::config(
                "[http] timeout_secs must be greater than zero",
            ));
        }

        Ok(Self {
            iped: iped_config,
            salesforce: salesforce_config,
            http: raw.http,
            export: raw.export,
            transform: raw.transform,
        })
    }

    /// The `[export]` section, required by the CSV export pipeline.
    pub fn require_export(&self) -> Result<&ExportConfig> {
        self.export.as_ref().ok_or_else(|| {
            IntegratorError::config(format!(
                "Config file has no [{EXPORT_SECTION}] section"
            ))
        })
    }
}

/// Fail unless `section` exists and holds every key in `required`.
pub fn validate_required_fields(table: &Table, section: &str, required: &[&str]) -> Result<()> {
    let section_table = table
        .get(section)
        .and_then(Value::as_table)
        .ok_or_else(|| IntegratorError::config(format!("Config file has no [{section}] section")))?;

    for field in required {
        if !section_table.contains_key(*field) {
            return Err(IntegratorError::config(format!(
                "Config file has no field '{field}' in section [{section}]"
            )));
        }
    }
    Ok(())
}

fn apply_env_overrides(table: &mut Table, env: &impl Fn(&str) -> Option<String>) {
    for (var, section, key) in ENV_OVERRIDES {
        let Some(value) = env(var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let entry = table
            .entry(section.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        if let Value::Table(section_table) = entry {
            section_table.insert(key.to_string(), Value::String(value));
        }
    }
}

/// `base + endpoint`, checked to be an absolute URL.
pub fn join_url(base: &str, endpoint: &str) -> Result<String> {
    let url = format!("{base}{endpoint}");
    reqwest::Url::parse(&url)
        .map_err(|e| IntegratorError::config(format!("Malformed URL '{url}': {e}")))?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
[iped]
token_home = "home-token"
token_branch = "branch-token"
base_url = "https://api.iped.com.br"
users_endpoint = "/api/user/get-users"
user_profile_endpoint = "/api/user/get-profile"
trails_endpoint = "/api/user/get-trails"
all_courses_endpoint = "/api/course/get-courses"
finished_courses_endpoint = "/api/user/get-finished-courses"
inprogress_courses_endpoint = "/api/user/get-inprogress-courses"
course_summary_endpoint = "/api/course/get-summary"

[salesforce]
client_id = "123"
client_secret = "456"
base_url = "https://mc.example.com"
dataevents_endpoint = "/hub/v1/dataevents/key:123/rowset"
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parses_and_joins_urls() {
        let config = Config::from_toml_str(SAMPLE, no_env).unwrap();
        assert_eq!(config.iped.users_url, "https://api.iped.com.br/api/user/get-users");
        assert_eq!(config.iped.token(Tenancy::Home), "home-token");
        assert_eq!(config.iped.token(Tenancy::Branch), "branch-token");
        assert_eq!(
            config.salesforce.dataevents_url,
            "https://mc.example.com/hub/v1/dataevents/key:123/rowset"
        );
        assert_eq!(config.salesforce.auth_url, "https://mc.example.com/v2/token");
        assert_eq!(config.http.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.transform.policy, FailurePolicy::FailFast);
        assert!(config.export.is_none());
        assert!(config.require_export().is_err());
    }

    #[test]
    fn test_missing_section_is_reported() {
        let content = SAMPLE.split("[salesforce]").next().unwrap();
        let err = Config::from_toml_str(content, no_env).unwrap_err();
        assert!(matches!(err, IntegratorError::Config(_)));
        assert!(err.to_string().contains("[salesforce]"));
    }

    #[test]
    fn test_missing_field_is_reported() {
        let content = SAMPLE.replace("trails_endpoint = \"/api/user/get-trails\"\n", "");
        let err = Config::from_toml_str(&content, no_env).unwrap_err();
        assert!(err.to_string().contains("'trails_endpoint' in section [iped]"));
    }

    #[test]
    fn test_malformed_url_is_a_config_error() {
        let content = SAMPLE.replace("https://api.iped.com.br", "api.iped.com.br");
        let err = Config::from_toml_str(&content, no_env).unwrap_err();
        assert!(matches!(err, IntegratorError::Config(ref m) if m.contains("Malformed URL")));
    }

    #[test]
    fn test_env_overrides_file_secrets() {
        let content = SAMPLE.replace("token_branch = \"branch-token\"\n", "");
        let config = Config::from_toml_str(&content, |name| match name {
            "IPED_TOKEN_BRANCH" => Some("from-env".to_string()),
            "SALESFORCE_CLIENT_SECRET" => Some("secret-env".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.iped.token_branch, "from-env");
        assert_eq!(config.salesforce.client_secret, "secret-env");
    }

    #[test]
    fn test_optional_sections() {
        let content = format!(
            "{SAMPLE}\n[http]\ntimeout_secs = 5\nmax_attempts = 4\n\n[export]\nurl = \"https://iped.example.com/report.csv\"\nkey_column = \"E-mail\"\n\n[transform]\npolicy = \"best-effort\"\nphone_columns = [\"Fone\"]\n"
        );
        let config = Config::from_toml_str(&content, no_env).unwrap();
        assert_eq!(config.http.timeout(), Duration::from_secs(5));
        assert_eq!(config.http.retry_policy().max_attempts, 4);
        let export = config.require_export().unwrap();
        assert_eq!(export.delimiter, ';');
        assert_eq!(export.key_column, "E-mail");
        assert_eq!(config.transform.policy, FailurePolicy::BestEffort);
        assert_eq!(config.transform.phone_columns, vec!["Fone".to_string()]);
        assert_eq!(config.transform.drop_columns, column_list(DEFAULT_DROP_COLUMNS));
    }

    #[test]
    fn test_export_section_requires_key_column() {
        let content = format!("{SAMPLE}\n[export]\nurl = \"https://iped.example.com/report.csv\"\n");
        let err = Config::from_toml_str(&content, no_env).unwrap_err();
        assert!(err.to_string().contains("'key_column' in section [export]"));
    }
}
