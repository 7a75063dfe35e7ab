/// IPED API envelope and payload field names.
/// These are the keys the API uses in every JSON response it returns.

// Envelope
pub const STATE_FIELD: &str = "STATE";
pub const STATE_SUCCESS: i64 = 1;
pub const CURRENT_PAGE_FIELD: &str = "CURRENT_PAGE";
pub const TOTAL_PAGES_FIELD: &str = "TOTAL_PAGES";

// Payload fields
pub const USERS_FIELD: &str = "USERS";
pub const PROFILE_FIELD: &str = "PROFILE";
pub const TRAILS_FIELD: &str = "TRAILS";
pub const COURSES_FIELD: &str = "COURSES";
pub const SUMMARY_FIELD: &str = "SUMMARY";

// Request form fields
pub const API_VERSION: &str = "2";
pub const COURSE_ID_PARAM: &str = "course_id";
pub const PAGE_PARAM: &str = "page";

/// Salesforce rejects data-event payloads above 5 MiB; batches are flushed at
/// half of that.
pub const PAYLOAD_LIMIT_IN_BYTES: usize = 2_097_152;

/// Completion percentage at which a course counts as completed.
pub const COURSE_COMPLETED_RATE: f64 = 100.0;

/// IPED's placeholder for "no date".
pub const INVALID_DATE_SENTINEL: &str = "0000-00-00 00:00:00";

/// Display format for every date column sent to Salesforce.
pub const OUTPUT_DATE_FORMAT: &str = "%d/%m/%Y";

pub const DEFAULT_CONFIG_PATH: &str = "integrator.toml";
pub const DEFAULT_COUNTRY_CODE: &str = "55";
pub const DEFAULT_CSV_DELIMITER: char = ';';
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 500;

// Columns of the IPED CSV report, used when [transform] doesn't override them
pub const DEFAULT_DROP_COLUMNS: &[&str] = &["Depoimento"];
pub const DEFAULT_DATE_COLUMNS: &[&str] = &[
    "Data de cadastro",
    "Data de início",
    "Data de conclusão",
    "Último acesso",
];
pub const DEFAULT_PHONE_COLUMNS: &[&str] = &["Telefone", "Celular"];
pub const DEFAULT_PERCENTAGE_COLUMNS: &[&str] = &["Progresso"];
pub const DEFAULT_DURATION_COLUMNS: &[&str] = &["Carga horária", "Horas concluídas"];

/// Owned copy of one of the column lists above.
pub fn column_list(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}
