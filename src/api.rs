use crate::errors::{backend_message, ClientError};
use crate::models::{
    AdminOverview, Insight, NewSubscription, NewUser, Priority, RenewalWindowEntry, Subscription,
    SubscriptionUpdate, SummaryAggregate, User,
};
use crate::session::{ApiRequest, SessionManager};
use crate::stats;
use reqwest::Response;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::warn;

pub const SUBSCRIPTIONS_PATH: &str = "/api/subscriptions/";
pub const USERS_PATH: &str = "/auth/users/";
pub const USER_REGISTER_PATH: &str = "/auth/user-register/";
pub const UPCOMING_RENEWALS_PATH: &str = "/analytics/upcoming-renewals/";
pub const SUMMARY_PATH: &str = "/analytics/summary/";
pub const INSIGHTS_PATH: &str = "/analytics/ai-suggestions/";

pub fn generic_insight() -> Insight {
    Insight {
        kind: "cost_optimization".to_string(),
        message: "Consider reviewing your subscription costs regularly to optimize spending."
            .to_string(),
        priority: Priority::Medium,
    }
}

#[derive(Clone)]
pub struct ApiClient {
    session: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub async fn subscriptions(&self) -> Result<Vec<Subscription>, ClientError> {
        let response = self.session.send(&ApiRequest::get(SUBSCRIPTIONS_PATH)).await?;
        parse_response(response, "Failed to fetch subscriptions", &[]).await
    }

    pub async fn subscription(&self, id: i64) -> Result<Subscription, ClientError> {
        let response = self.session.send(&ApiRequest::get(subscription_path(id))).await?;
        parse_response(response, "Failed to fetch subscription", &[]).await
    }

    pub async fn create_subscription(&self, new: &NewSubscription) -> Result<Subscription, ClientError> {
        let request = ApiRequest::post(SUBSCRIPTIONS_PATH).json(new)?;
        let response = self.session.send(&request).await?;
        parse_response(response, "Failed to create subscription", &[]).await
    }

    pub async fn update_subscription(
        &self,
        id: i64,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription, ClientError> {
        let request = ApiRequest::put(subscription_path(id)).json(update)?;
        let response = self.session.send(&request).await?;
        parse_response(response, "Failed to update subscription", &[]).await
    }

    pub async fn delete_subscription(&self, id: i64) -> Result<(), ClientError> {
        let response = self.session.send(&ApiRequest::delete(subscription_path(id))).await?;
        ensure_success(response, "Failed to delete subscription", &[]).await?;
        Ok(())
    }

    pub async fn users(&self) -> Result<Vec<User>, ClientError> {
        let response = self.session.send(&ApiRequest::get(USERS_PATH)).await?;
        parse_response(response, "Failed to fetch users", &[]).await
    }

    pub async fn create_user(&self, new: &NewUser) -> Result<User, ClientError> {
        self.ensure_admin("only administrators can create users")?;
        let request = ApiRequest::post(USER_REGISTER_PATH).json(new)?;
        let response = self.session.send(&request).await?;
        parse_response(
            response,
            "Failed to create user. Please try again.",
            &["username", "email"],
        )
        .await
    }

    pub async fn upcoming_renewals(&self) -> Result<Vec<RenewalWindowEntry>, ClientError> {
        match self.fetch::<Vec<RenewalWindowEntry>>(UPCOMING_RENEWALS_PATH).await {
            Err(err) if err.is_fallback_trigger() => {
                warn!("upcoming renewals endpoint failed, computing locally: {err}");
                let subscriptions = self.subscriptions().await?;
                Ok(stats::upcoming_renewals(&subscriptions))
            }
            result => result,
        }
    }

    pub async fn summary(&self) -> Result<SummaryAggregate, ClientError> {
        match self.fetch::<SummaryAggregate>(SUMMARY_PATH).await {
            Err(err) if err.is_fallback_trigger() => {
                warn!("summary endpoint failed, computing locally: {err}");
                let subscriptions = self.subscriptions().await?;
                Ok(stats::summary(&subscriptions))
            }
            result => result,
        }
    }

    pub async fn insights(&self) -> Vec<Insight> {
        match self.fetch::<Vec<Insight>>(INSIGHTS_PATH).await {
            Ok(insights) => insights,
            Err(err) => {
                warn!("insights endpoint failed, using generic insight: {err}");
                vec![generic_insight()]
            }
        }
    }

    pub async fn admin_overview(&self) -> Result<AdminOverview, ClientError> {
        self.ensure_admin("only administrators can view the system overview")?;
        let subscriptions = self.subscriptions().await?;
        let users = self.users().await?;
        Ok(stats::admin_overview(&subscriptions, &users))
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.session.send(&ApiRequest::get(path)).await?;
        parse_response(response, "Request failed", &[]).await
    }

    fn ensure_admin(&self, reason: &str) -> Result<(), ClientError> {
        match self.session.current_user() {
            Some(user) if user.is_admin() => Ok(()),
            _ => Err(ClientError::Forbidden(reason.to_string())),
        }
    }
}

fn subscription_path(id: i64) -> String {
    format!("{SUBSCRIPTIONS_PATH}{id}/")
}

async fn ensure_success(
    response: Response,
    fallback: &str,
    field_keys: &[&str],
) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = backend_message(&body, field_keys).unwrap_or_else(|| fallback.to_string());
    Err(ClientError::Api { status, message })
}

async fn parse_response<T: DeserializeOwned>(
    response: Response,
    fallback: &str,
    field_keys: &[&str],
) -> Result<T, ClientError> {
    let response = ensure_success(response, fallback, field_keys).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|err| ClientError::Decode(err.to_string()))
}
