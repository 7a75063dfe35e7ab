use crate::apis::iped::IpedClient;
use crate::common::constants::{PROFILE_FIELD, USERS_FIELD};
use crate::common::error::Result;
use crate::common::json::array_field;
use crate::common::retry::RetryPolicy;
use crate::common::types::{Tenancy, User};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, instrument};

pub struct UserService {
    client: IpedClient,
    retry: RetryPolicy,
}

impl UserService {
    pub fn new(client: IpedClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Every user of both tenancies, home office first. A user listed by both
    /// keeps its home-office record.
    #[instrument(skip(self))]
    pub async fn get_users_basic_info(&self) -> Result<Vec<User>> {
        let started = Instant::now();
        let mut users = Vec::new();
        let mut seen = HashSet::new();

        for tenancy in [Tenancy::Home, Tenancy::Branch] {
            info!(?tenancy, "Fetching users");
            for user in self.fetch_users(tenancy).await? {
                if seen.insert(user.id) {
                    users.push(user);
                }
            }
        }

        info!(
            users = users.len(),
            secs = started.elapsed().as_secs_f64(),
            "Fetched users basic info"
        );
        Ok(users)
    }

    async fn fetch_users(&self, tenancy: Tenancy) -> Result<Vec<User>> {
        let form = self.client.base_form(tenancy);
        let body = self
            .client
            .post_validated(&self.client.config().users_url, &form, &[USERS_FIELD])
            .await?;
        array_field(&body, USERS_FIELD, "body")?
            .iter()
            .map(|json| User::from_listing(json, tenancy))
            .collect()
    }

    /// Merge the user's profile into `user`, retrying transient failures.
    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn get_user_full_info(&self, user: &mut User) -> Result<()> {
        let url = &self.client.config().user_profile_url;
        let form = self.client.user_form(user);
        let body = self
            .retry
            .run("iped.user_profile", || {
                self.client.post_validated(url, &form, &[PROFILE_FIELD])
            })
            .await?;
        user.apply_profile(&body[PROFILE_FIELD])
    }
}
