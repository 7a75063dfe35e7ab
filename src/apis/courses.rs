//! Course retrieval and enrichment.
//!
//! Unlimited-plan users get their full history: the ids of in-progress and
//! finished courses, the combined listing for those ids (paginated), then one
//! summary call per course for the dates the listing lacks. Everyone else
//! gets one paginated pull of the listing, keeping courses they started.

use crate::apis::iped::IpedClient;
use crate::apis::validate::push_array_param;
use crate::app::ports::FormFields;
use crate::common::constants::{
    COURSES_FIELD, COURSE_ID_PARAM, CURRENT_PAGE_FIELD, PAGE_PARAM, SUMMARY_FIELD,
    TOTAL_PAGES_FIELD,
};
use crate::common::error::{IntegratorError, Result};
use crate::common::json::{array_field, as_i64, require, require_i64};
use crate::common::types::{Course, User};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

pub struct CourseService {
    client: IpedClient,
}

impl CourseService {
    pub fn new(client: IpedClient) -> Self {
        Self { client }
    }

    /// Fill `user.courses` according to the user's plan.
    #[instrument(skip(self, user), fields(user_id = user.id, user_type = ?user.user_type))]
    pub async fn get_user_courses(&self, user: &mut User) -> Result<()> {
        let started = Instant::now();
        user.courses = if user.user_type.is_none() {
            warn!("User has no resolved classification, skipping courses");
            Vec::new()
        } else if user.is_unlimited() {
            self.get_full_courses(user).await?
        } else {
            self.get_started_courses(user).await?
        };
        debug!(
            courses = user.courses.len(),
            secs = started.elapsed().as_secs_f64(),
            "Fetched courses"
        );
        Ok(())
    }

    /// Full enrichment: ids, paginated listing, then per-course summaries.
    pub async fn get_full_courses(&self, user: &User) -> Result<Vec<Course>> {
        let config = self.client.config();
        let form = self.client.user_form(user);

        info!("Fetching in-progress and finished course ids");
        let mut course_ids = self.get_course_ids(&config.inprogress_courses_url, &form).await?;
        course_ids.extend(self.get_course_ids(&config.finished_courses_url, &form).await?);

        if course_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut listing_form = form.clone();
        push_array_param(&mut listing_form, COURSE_ID_PARAM, &course_ids);
        let mut courses = self.fetch_course_pages(&listing_form).await?;

        info!(courses = courses.len(), "Fetching course summaries");
        self.apply_summaries(&form, &mut courses).await?;
        Ok(courses)
    }

    /// Courses from the listing with any progress at all, without summaries.
    pub async fn get_started_courses(&self, user: &User) -> Result<Vec<Course>> {
        let form = self.client.user_form(user);
        let courses = self.fetch_course_pages(&form).await?;
        Ok(courses
            .into_iter()
            .filter(|course| course.completion_rate > 0.0)
            .collect())
    }

    async fn get_course_ids(&self, url: &str, form: &FormFields) -> Result<Vec<i64>> {
        let body = self.client.post_validated(url, form, &[COURSES_FIELD]).await?;
        array_field(&body, COURSES_FIELD, "body")?
            .iter()
            .map(|course| require_i64(course, "course_id", "COURSES[]"))
            .collect()
    }

    /// Fetch every page of the combined listing for `form`, starting at page 1.
    ///
    /// Courses are merged by id: a later page replaces an earlier record with
    /// the same id, and the order in which ids were first seen is kept.
    pub async fn fetch_course_pages(&self, form: &FormFields) -> Result<Vec<Course>> {
        let url = &self.client.config().all_courses_url;
        let required = [COURSES_FIELD, CURRENT_PAGE_FIELD, TOTAL_PAGES_FIELD];
        let mut merged = CourseMerge::default();
        let mut page: i64 = 1;

        loop {
            let mut page_form = form.clone();
            page_form.push((PAGE_PARAM.to_string(), page.to_string()));
            let body = self.client.post_validated(url, &page_form, &required).await?;
            crate::observability::metrics::iped::page_fetched();

            for json in array_field(&body, COURSES_FIELD, "body")? {
                merged.insert(Course::from_listing(json)?);
            }

            let current = page_number(&body, CURRENT_PAGE_FIELD)?;
            let total = page_number(&body, TOTAL_PAGES_FIELD)?;
            debug!(page, current, total, "Fetched course page");

            // our own counter stops the loop too if CURRENT_PAGE never advances
            if current >= total || page >= total {
                break;
            }
            page += 1;
        }

        Ok(merged.into_courses())
    }

    async fn apply_summaries(&self, form: &FormFields, courses: &mut [Course]) -> Result<()> {
        let url = &self.client.config().course_summary_url;
        for course in courses.iter_mut() {
            let mut summary_form = form.clone();
            summary_form.push((COURSE_ID_PARAM.to_string(), course.id.to_string()));
            let body = self
                .client
                .post_validated(url, &summary_form, &[SUMMARY_FIELD])
                .await?;
            crate::observability::metrics::iped::summary_fetched();
            course.apply_summary(require(&body, SUMMARY_FIELD, "body")?)?;
            debug!(course_id = course.id, "Applied course summary");
        }
        Ok(())
    }
}

fn page_number(body: &Value, field: &str) -> Result<i64> {
    as_i64(&body[field]).ok_or_else(|| {
        IntegratorError::response(200, body.to_string(), format!("{field} is not a page number"))
    })
}

/// Insertion-ordered merge of courses keyed by id; later inserts win.
#[derive(Default)]
struct CourseMerge {
    courses: Vec<Course>,
    index: HashMap<i64, usize>,
}

impl CourseMerge {
    fn insert(&mut self, course: Course) {
        match self.index.get(&course.id) {
            Some(&pos) => self.courses[pos] = course,
            None => {
                self.index.insert(course.id, self.courses.len());
                self.courses.push(course);
            }
        }
    }

    fn into_courses(self) -> Vec<Course> {
        self.courses
    }
}
