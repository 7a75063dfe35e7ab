use crate::common::constants::COURSE_COMPLETED_RATE;
use crate::common::error::{IntegratorError, Result};
use crate::common::json::{optional_string, require, require_f64, require_i64, require_string};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which IPED tenant a user was found in. Each tenant has its own API token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tenancy {
    /// Matriz
    Home,
    /// Filial
    Branch,
}

impl Tenancy {
    pub fn is_branch(self) -> bool {
        matches!(self, Tenancy::Branch)
    }
}

/// IPED user classification, as sent in `PROFILE.user_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    FreeCourse,
    PlusCourse,
    PremiumCourse,
    UnlimitedPlan,
}

impl TryFrom<i64> for UserType {
    type Error = IntegratorError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            1 => Ok(UserType::FreeCourse),
            2 => Ok(UserType::PlusCourse),
            3 => Ok(UserType::PremiumCourse),
            4 => Ok(UserType::UnlimitedPlan),
            other => Err(IntegratorError::response(
                200,
                other.to_string(),
                format!("PROFILE.user_type has unknown code {other}"),
            )),
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UserType::FreeCourse => "FREE_COURSE",
            UserType::PlusCourse => "PLUS_COURSE",
            UserType::PremiumCourse => "PREMIUM_COURSE",
            UserType::UnlimitedPlan => "UNLIMITED_PLAN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseState {
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "in-progress")]
    InProgress,
}

impl CourseState {
    pub fn from_completion(rate: f64) -> Self {
        if rate >= COURSE_COMPLETED_RATE {
            CourseState::Completed
        } else {
            CourseState::InProgress
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub rating: Option<String>,
    pub category: Option<String>,
    pub hours: f64,
    pub completion_rate: f64,
    pub finished_hours: f64,
    pub start_date: Option<String>,
    pub conclusion_date: Option<String>,
    pub last_access: Option<String>,
    pub state: CourseState,
}

impl Course {
    /// Build a course from one record of the combined course listing.
    /// Dates stay empty; only the per-course summary carries them.
    pub fn from_listing(json: &Value) -> Result<Self> {
        let id = require_i64(json, "course_id", "COURSES[]")?;
        let path = format!("COURSES[{id}]");
        let hours = require_f64(json, "course_hours", &path)?;
        let course_user = require(json, "course_user", &path)?;
        let completion_rate = require_f64(
            course_user,
            "user_course_completed",
            &format!("{path}.course_user"),
        )?;

        Ok(Self {
            id,
            name: require_string(json, "course_title", &path)?,
            rating: optional_string(json, "course_rating"),
            category: optional_string(json, "course_category_title"),
            hours,
            completion_rate,
            finished_hours: finished_hours(hours, completion_rate),
            start_date: None,
            conclusion_date: None,
            last_access: None,
            state: CourseState::from_completion(completion_rate),
        })
    }

    /// Merge the dates from a `SUMMARY` payload.
    pub fn apply_summary(&mut self, summary: &Value) -> Result<()> {
        let path = format!("SUMMARY[{}]", self.id);
        let course_user = require(summary, "course_user", &path)?;
        self.start_date = optional_string(course_user, "user_course_date_start");
        self.last_access = optional_string(course_user, "user_course_date_lastaccess");
        self.conclusion_date = optional_string(course_user, "user_course_date_conclusion");
        Ok(())
    }
}

/// Hours completed, rounded to one decimal place.
pub fn finished_hours(hours: f64, completion_rate: f64) -> f64 {
    (hours * (completion_rate / 100.0) * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    /// Per-user token required by every per-user IPED endpoint.
    #[serde(skip_serializing, default)]
    pub token: String,
    pub tenancy: Tenancy,

    pub cpf: Option<String>,
    pub email: Option<String>,
    pub points: i64,
    pub user_type: Option<UserType>,
    pub trails: Vec<String>,
    pub courses: Vec<Course>,
}

impl User {
    pub fn new(id: i64, name: impl Into<String>, token: impl Into<String>, tenancy: Tenancy) -> Self {
        Self {
            id,
            name: name.into(),
            token: token.into(),
            tenancy,
            cpf: None,
            email: None,
            points: 0,
            user_type: None,
            trails: Vec::new(),
            courses: Vec::new(),
        }
    }

    /// Build a user from one record of the `USERS` listing.
    pub fn from_listing(json: &Value, tenancy: Tenancy) -> Result<Self> {
        let id = require_i64(json, "user_id", "USERS[]")?;
        let path = format!("USERS[{id}]");
        Ok(Self::new(
            id,
            require_string(json, "user_name", &path)?,
            require_string(json, "user_token", &path)?,
            tenancy,
        ))
    }

    /// Merge the fields of a `PROFILE` payload into this user.
    pub fn apply_profile(&mut self, profile: &Value) -> Result<()> {
        let path = format!("PROFILE[{}]", self.id);
        let points = require(profile, "user_ranking", &path)
            .and_then(|r| require(r, "user_points", &format!("{path}.user_ranking")))
            .and_then(|p| require_i64(p, "total", &format!("{path}.user_ranking.user_points")))?;
        let user_type = UserType::try_from(require_i64(profile, "user_type", &path)?)?;

        self.cpf = optional_string(profile, "user_cpf");
        self.email = optional_string(profile, "user_email");
        self.points = points;
        self.user_type = Some(user_type);
        Ok(())
    }

    pub fn is_unlimited(&self) -> bool {
        self.user_type == Some(UserType::UnlimitedPlan)
    }
}
