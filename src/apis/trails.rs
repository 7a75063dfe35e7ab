use crate::apis::iped::IpedClient;
use crate::common::constants::TRAILS_FIELD;
use crate::common::error::Result;
use crate::common::json::{array_field, require_string};
use crate::common::types::User;
use tracing::{debug, instrument};

pub struct TrailService {
    client: IpedClient,
}

impl TrailService {
    pub fn new(client: IpedClient) -> Self {
        Self { client }
    }

    /// Replace the user's trails with the titles IPED lists for them.
    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn get_user_trails(&self, user: &mut User) -> Result<()> {
        let form = self.client.user_form(user);
        let body = self
            .client
            .post_validated(&self.client.config().trails_url, &form, &[TRAILS_FIELD])
            .await?;

        user.trails = array_field(&body, TRAILS_FIELD, "body")?
            .iter()
            .map(|trail| require_string(trail, "trail_title", "TRAILS[]"))
            .collect::<Result<Vec<_>>>()?;
        debug!(trails = user.trails.len(), "Fetched trails");
        Ok(())
    }
}
