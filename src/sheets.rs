// Sheets API client
// One read-only call: spreadsheets.values.get

use anyhow::Context;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::auth::AuthorizedClient;
use crate::error::{AppError, Result};

/// Default Sheets API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://sheets.googleapis.com";

/// Cell range returned by values.get
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    pub range: Option<String>,
    pub major_dimension: Option<String>,
    /// Rows of cells; absent when the range is empty
    pub values: Option<Vec<Vec<Value>>>,
}

impl ValueRange {
    pub fn rows(&self) -> &[Vec<Value>] {
        self.values.as_deref().unwrap_or_default()
    }
}

/// Google API error envelope
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client for the Sheets v4 API
pub struct SheetsClient {
    client: Client,
    endpoint: Url,
}

impl SheetsClient {
    pub fn new(client: Client, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AppError::Config(format!("Invalid Sheets endpoint {}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "Invalid Sheets endpoint: {}",
                endpoint
            )));
        }

        Ok(Self { client, endpoint })
    }

    /// URL of values.get for a spreadsheet and A1 range
    fn values_url(&self, spreadsheet_id: &str, range: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v4", "spreadsheets", spreadsheet_id, "values", range]);
        }
        url
    }

    /// Fetch the values of a range
    pub async fn get_values(
        &self,
        auth: &mut AuthorizedClient,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<ValueRange> {
        let access_token = auth.access_token().await?;
        let url = self.values_url(spreadsheet_id, range);

        tracing::debug!(url = %url, "Fetching spreadsheet values");

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to send values request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);

            tracing::warn!(status = %status, "Sheets API returned an error");

            return Err(AppError::Fetch {
                status: status.as_u16(),
                message,
            });
        }

        let values: ValueRange = response
            .json()
            .await
            .context("Failed to parse values response")?;

        tracing::debug!(rows = values.rows().len(), "Fetched spreadsheet values");

        Ok(values)
    }
}
