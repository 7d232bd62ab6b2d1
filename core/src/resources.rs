//! Thin endpoint helpers. Each one formats a path under the current user
//! (`user/-/...`) and delegates to `get`, `post` or `delete`.

use chrono::NaiveDate;
use serde_json::Value;

use crate::client::FitbyteClient;
use crate::config::RequestOptions;
use crate::error::Result;
use crate::types::Payload;

fn date_path(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Period accepted by time-series endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    OneDay,
    SevenDays,
    ThirtyDays,
    OneWeek,
    OneMonth,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::SevenDays => "7d",
            Period::ThirtyDays => "30d",
            Period::OneWeek => "1w",
            Period::OneMonth => "1m",
        }
    }
}

impl FitbyteClient {
    pub fn profile(&self, options: &RequestOptions) -> Result<Payload> {
        self.get("user/-/profile.json", options)
    }

    pub fn devices(&self, options: &RequestOptions) -> Result<Payload> {
        self.get("user/-/devices.json", options)
    }

    pub fn daily_activity_summary(&self, date: NaiveDate, options: &RequestOptions) -> Result<Payload> {
        self.get(&format!("user/-/activities/date/{}.json", date_path(date)), options)
    }

    /// Log an activity. `body` may use snake_case keys; they are camelized on
    /// the wire.
    pub fn log_activity(&self, body: &Value, options: &RequestOptions) -> Result<Payload> {
        self.post("user/-/activities.json", body, options)
    }

    pub fn delete_activity_log(&self, log_id: u64, options: &RequestOptions) -> Result<Payload> {
        self.delete(&format!("user/-/activities/{log_id}.json"), options)
    }

    pub fn heart_rate_time_series(
        &self,
        date: NaiveDate,
        period: Period,
        options: &RequestOptions,
    ) -> Result<Payload> {
        self.get(
            &format!("user/-/activities/heart/date/{}/{}.json", date_path(date), period.as_str()),
            options,
        )
    }

    pub fn sleep_logs(&self, date: NaiveDate, options: &RequestOptions) -> Result<Payload> {
        self.get(&format!("user/-/sleep/date/{}.json", date_path(date)), options)
    }

    pub fn log_water(&self, body: &Value, options: &RequestOptions) -> Result<Payload> {
        self.post("user/-/foods/log/water.json", body, options)
    }
}
