/// Blocking HTTP client for the flood prediction backend.
///
/// Thin on purpose: each method builds the URL with `api::build_*`, sends
/// the request, turns a non-2xx status into `ApiError::Status`, and hands
/// the body to the matching `api::parse_*` function. The session (and its
/// bearer token) is injected at construction.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::Serialize;

use crate::analysis::statistics::DataStats;
use crate::config::ApiConfig;
use crate::export::ExportFormat;
use crate::ingest::api::{
    self, ApiError, AuthToken, CleanupReport, ForecastRange, HistoricalQuery, IngestReport,
};
use crate::model::{
    AlertEvent, BatchPrediction, CurrentUser, Forecast, HistoricalRecord, PredictionInput,
    PredictionResult, RegionRisk, Subscription, TrendSeries,
};
use crate::session::SessionContext;

/// Valid range for `days` on the risk-trend endpoint.
pub const TREND_DAYS: std::ops::RangeInclusive<u32> = 1..=30;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: SessionContext,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, session: SessionContext) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| ApiError::Http {
                endpoint: config.base_url.clone(),
                source,
            })?;
        Ok(ApiClient {
            http,
            base_url: config.base_url.clone(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    // -- Regions ------------------------------------------------------------

    pub fn regions(&self, sort_by: Option<&str>) -> Result<Vec<RegionRisk>, ApiError> {
        let body = self.get(api::REGIONS, &api::build_regions_url(&self.base_url, sort_by), false)?;
        api::parse_regions_response(&body)
    }

    pub fn region(&self, region_id: &str) -> Result<RegionRisk, ApiError> {
        let body = self.get(api::REGIONS, &api::build_region_url(&self.base_url, region_id), false)?;
        api::parse_region_response(&body)
    }

    // -- Data ---------------------------------------------------------------

    pub fn historical(&self, query: &HistoricalQuery) -> Result<Vec<HistoricalRecord>, ApiError> {
        let url = api::build_historical_url(&self.base_url, query);
        let body = self.get(api::HISTORICAL, &url, false)?;
        api::parse_historical_response(&body)
    }

    pub fn stats(&self) -> Result<DataStats, ApiError> {
        let body = self.get(api::STATS, &api::build_stats_url(&self.base_url), false)?;
        api::parse_stats_response(&body)
    }

    /// Raw export body (CSV text or a JSON array).
    pub fn export(&self, format: ExportFormat, region_id: Option<&str>) -> Result<String, ApiError> {
        let url = api::build_export_url(&self.base_url, format, region_id);
        self.get(api::EXPORT, &url, false)
    }

    // -- Predictions --------------------------------------------------------

    pub fn predict(&self, input: &PredictionInput) -> Result<PredictionResult, ApiError> {
        api::validate_prediction_input(input)?;
        let body = self.post(api::PREDICT, &api::build_predict_url(&self.base_url), input, false)?;
        api::parse_prediction_response(&body)
    }

    pub fn batch_predict(&self, inputs: &[PredictionInput]) -> Result<BatchPrediction, ApiError> {
        for input in inputs {
            api::validate_prediction_input(input)?;
        }
        let request = api::BatchPredictRequest { data: inputs };
        let url = api::build_batch_predict_url(&self.base_url);
        let body = self.post(api::BATCH_PREDICT, &url, &request, false)?;
        api::parse_batch_response(&body)
    }

    pub fn risk_trend(&self, region_id: &str, days: u32) -> Result<TrendSeries, ApiError> {
        if !TREND_DAYS.contains(&days) {
            return Err(ApiError::InvalidInput(format!("days must be 1-30, got {}", days)));
        }
        let url = api::build_trend_url(&self.base_url, region_id, days);
        let body = self.get(api::RISK_TREND, &url, false)?;
        api::parse_trend_response(&body)
    }

    // -- Forecasts ----------------------------------------------------------

    pub fn latest_forecasts(&self) -> Result<Vec<Forecast>, ApiError> {
        let url = api::build_latest_forecasts_url(&self.base_url);
        let body = self.get(api::FORECAST_LATEST, &url, false)?;
        api::parse_latest_forecasts_response(&body)
    }

    pub fn forecast_history(&self, region: &str, range: ForecastRange) -> Result<Vec<Forecast>, ApiError> {
        match range {
            ForecastRange::LastDays(0) => {
                return Err(ApiError::InvalidInput("days must be positive".to_string()));
            }
            ForecastRange::Between(start, end) if start > end => {
                return Err(ApiError::InvalidInput(format!(
                    "start date {} is after end date {}",
                    start, end
                )));
            }
            _ => {}
        }
        let url = api::build_forecast_history_url(&self.base_url, region, range);
        let body = self.get(api::FORECAST, &url, false)?;
        api::parse_forecast_history_response(&body)
    }

    // -- Alerts -------------------------------------------------------------

    pub fn simulate_alerts(&self, threshold: f64) -> Result<Vec<AlertEvent>, ApiError> {
        let body = self.get(api::ALERTS, &api::build_alerts_url(&self.base_url, threshold), false)?;
        api::parse_alerts_response(&body)
    }

    // -- Auth ---------------------------------------------------------------

    pub fn login(&self, username: &str, password: &str) -> Result<AuthToken, ApiError> {
        let request = api::LoginRequest { username, password };
        let body = self.post(api::LOGIN, &api::build_login_url(&self.base_url), &request, false)?;
        api::parse_token_response(&body)
    }

    pub fn signup(&self, request: &api::SignupRequest<'_>) -> Result<String, ApiError> {
        let body = self.post(api::SIGNUP, &api::build_signup_url(&self.base_url), request, false)?;
        api::parse_signup_response(&body)
    }

    pub fn me(&self) -> Result<CurrentUser, ApiError> {
        let body = self.get(api::AUTH_ME, &api::build_me_url(&self.base_url), true)?;
        api::parse_me_response(&body)
    }

    // -- Admin (admin token required) ---------------------------------------

    pub fn admin_ingest(&self) -> Result<IngestReport, ApiError> {
        let url = api::build_ingest_url(&self.base_url);
        let body = self.post(api::ADMIN_INGEST, &url, &serde_json::json!({}), true)?;
        api::parse_ingest_response(&body)
    }

    pub fn admin_cleanup(&self, days: u32) -> Result<CleanupReport, ApiError> {
        let url = api::build_cleanup_url(&self.base_url, days);
        log::debug!("DELETE {}", url);
        let request = self.authorize(self.http.delete(&url), true)?;
        let body = self.send(api::ADMIN_CLEANUP, request)?;
        api::parse_cleanup_response(&body)
    }

    // -- Subscriptions (bearer token required) ------------------------------

    pub fn subscriptions(&self) -> Result<Vec<Subscription>, ApiError> {
        let url = api::build_subscriptions_url(&self.base_url);
        let body = self.get(api::SUBSCRIPTIONS, &url, true)?;
        api::parse_subscriptions_response(&body)
    }

    pub fn subscribe(&self, region: &str) -> Result<Subscription, ApiError> {
        let url = api::build_subscriptions_url(&self.base_url);
        let request = api::SubscriptionRequest { region };
        let body = self.post(api::SUBSCRIPTIONS, &url, &request, true)?;
        api::parse_subscription_response(&body)
    }

    pub fn unsubscribe(&self, subscription_id: i64) -> Result<(), ApiError> {
        let url = api::build_subscription_url(&self.base_url, subscription_id);
        log::debug!("DELETE {}", url);
        let request = self.authorize(self.http.delete(&url), true)?;
        self.send(api::SUBSCRIPTIONS, request).map(|_| ())
    }

    // -- Plumbing -----------------------------------------------------------

    fn get(&self, endpoint: &str, url: &str, auth: bool) -> Result<String, ApiError> {
        log::debug!("GET {}", url);
        let request = self.authorize(self.http.get(url), auth)?;
        self.send(endpoint, request)
    }

    fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        url: &str,
        body: &B,
        auth: bool,
    ) -> Result<String, ApiError> {
        log::debug!("POST {}", url);
        let request = self.authorize(self.http.post(url).json(body), auth)?;
        self.send(endpoint, request)
    }

    /// Adds the bearer token. Public endpoints send it when present;
    /// protected ones fail fast without it.
    fn authorize(&self, request: RequestBuilder, required: bool) -> Result<RequestBuilder, ApiError> {
        match (&self.session.token, required) {
            (Some(token), _) => Ok(request.bearer_auth(token)),
            (None, true) => Err(ApiError::NotAuthenticated),
            (None, false) => Ok(request),
        }
    }

    fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<String, ApiError> {
        let http_error = |source| ApiError::Http {
            endpoint: endpoint.to_string(),
            source,
        };
        let response = request
            .header("Accept", "application/json")
            .send()
            .map_err(http_error)?;
        let status = response.status();
        let body = response.text().map_err(http_error)?;

        if !status.is_success() {
            let message = api::parse_error_detail(&body).unwrap_or_else(|| body.trim().to_string());
            log::debug!("{} returned {}: {}", endpoint, status, message);
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(session: SessionContext) -> ApiClient {
        let config = ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
        };
        ApiClient::new(&config, session).expect("client should build")
    }

    #[test]
    fn test_subscriptions_require_login_before_any_request() {
        let anonymous = client(SessionContext::anonymous());
        assert!(matches!(anonymous.subscriptions(), Err(ApiError::NotAuthenticated)));
        assert!(matches!(anonymous.subscribe("Osh"), Err(ApiError::NotAuthenticated)));
        assert!(matches!(anonymous.unsubscribe(3), Err(ApiError::NotAuthenticated)));
    }

    #[test]
    fn test_protected_calls_need_a_token() {
        let anonymous = client(SessionContext::anonymous());
        assert!(matches!(anonymous.me(), Err(ApiError::NotAuthenticated)));
        assert!(matches!(anonymous.admin_ingest(), Err(ApiError::NotAuthenticated)));
        assert!(matches!(anonymous.admin_cleanup(30), Err(ApiError::NotAuthenticated)));
    }

    #[test]
    fn test_forecast_range_validated_locally() {
        let c = client(SessionContext::anonymous());
        assert!(matches!(
            c.forecast_history("osh", ForecastRange::LastDays(0)),
            Err(ApiError::InvalidInput(_))
        ));
        let start = chrono::NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let end = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(matches!(
            c.forecast_history("osh", ForecastRange::Between(start, end)),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_trend_days_validated_locally() {
        let c = client(SessionContext::anonymous());
        assert!(matches!(c.risk_trend("osh", 0), Err(ApiError::InvalidInput(_))));
        assert!(matches!(c.risk_trend("osh", 31), Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_prediction_month_validated_locally() {
        let c = client(SessionContext::anonymous());
        assert!(matches!(
            c.predict(&PredictionInput::sample(0)),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            c.batch_predict(&[PredictionInput::sample(4), PredictionInput::sample(13)]),
            Err(ApiError::InvalidInput(_))
        ));
    }
}
