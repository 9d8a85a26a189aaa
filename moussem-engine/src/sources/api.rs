//! Generic JSON API adapter, driven by the field map in the source spec.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use super::{finish_draft, CandidateDraft, NormalizerContext, RawPayload, RawRecord, SourceAdapter, SourceSpec};
use crate::common::error::{PipelineError, Result};
use crate::normalize::dates::parse_date;

pub struct ApiAdapter {
    spec: SourceSpec,
    context: Arc<NormalizerContext>,
    client: reqwest::Client,
}

impl ApiAdapter {
    pub fn new(spec: SourceSpec, context: Arc<NormalizerContext>) -> Result<Self> {
        if spec.endpoints.is_empty() {
            return Err(PipelineError::Validation {
                message: format!("api source '{}' has no endpoint", spec.name),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(spec.timeout())
            .build()
            .map_err(|e| PipelineError::SourceUnavailable {
                message: format!("building client for {}: {e}", spec.name),
            })?;
        Ok(Self {
            spec,
            context,
            client,
        })
    }

    fn mapping(&self) -> super::ApiMapping {
        self.spec.api.clone().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SourceAdapter for ApiAdapter {
    fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<RawRecord>> {
        let endpoint = &self.spec.endpoints[0];
        let mapping = self.mapping();

        let mut request = self.client.get(&endpoint.url);
        if let (Some(param), Some(since)) = (mapping.since_param.as_deref(), since) {
            request = request.query(&[(param, since.to_rfc3339())]);
        }
        if let Some(auth_env) = self.spec.auth_env.as_deref() {
            if let Ok(token) = std::env::var(auth_env) {
                request = request.bearer_auth(token);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::from_http(&self.spec.name, e))?;
        if response.status().as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(PipelineError::RateLimited {
                source_name: self.spec.name.clone(),
                retry_after,
            });
        }
        if !response.status().is_success() {
            return Err(PipelineError::SourceUnavailable {
                message: format!("{}: HTTP {}", self.spec.name, response.status()),
            });
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::from_http(&self.spec.name, e))?;

        let records = match mapping.records_path.as_deref() {
            Some(path) => value_at(&body, path).cloned().unwrap_or(Value::Null),
            None => body,
        };
        let Value::Array(items) = records else {
            return Err(PipelineError::Parse {
                message: format!("{}: response is not a record array", self.spec.name),
            });
        };

        let fetched_at = Utc::now();
        let mut raw_records = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let external_id = mapping
                .fields
                .external_id
                .as_deref()
                .and_then(|path| string_at(&item, path))
                .unwrap_or_else(|| format!("{}-{}", self.spec.name, index));
            let source_url = mapping
                .fields
                .url
                .as_deref()
                .and_then(|path| string_at(&item, path))
                .or_else(|| Some(endpoint.url.clone()));
            raw_records.push(RawRecord {
                external_id,
                source_url,
                payload: RawPayload::Json(item),
                fetched_at,
            });
        }
        debug!(source = %self.spec.name, count = raw_records.len(), "fetched api records");
        Ok(raw_records)
    }

    fn normalize(&self, raw: &RawRecord) -> Result<CandidateDraft> {
        let RawPayload::Json(item) = &raw.payload else {
            return Err(PipelineError::Parse {
                message: format!("{}: expected JSON payload", self.spec.name),
            });
        };
        let mapping = self.mapping();
        let fields = &mapping.fields;

        let raw_name = fields
            .name
            .as_deref()
            .and_then(|path| string_at(item, path))
            .ok_or_else(|| PipelineError::Validation {
                message: format!("{}: record {} has no name", self.spec.name, raw.external_id),
            })?;
        let start_date = fields
            .start_date
            .as_deref()
            .and_then(|path| string_at(item, path))
            .map(|s| parse_date(&s))
            .transpose()?;
        let end_date = fields
            .end_date
            .as_deref()
            .and_then(|path| string_at(item, path))
            .and_then(|s| parse_date(&s).ok());
        let event_type = fields
            .event_type
            .as_deref()
            .and_then(|path| string_at(item, path))
            .and_then(|s| s.parse().ok())
            .or(self.spec.default_event_type)
            .unwrap_or(moussem_core::domain::EventType::Festival);

        let draft = CandidateDraft {
            external_id: Some(raw.external_id.clone()),
            source_url: raw.source_url.clone(),
            raw_payload: raw.payload.to_value(),
            raw_name: raw_name.clone(),
            normalized_name: String::new(),
            event_type,
            start_date,
            end_date,
            raw_city: fields.city.as_deref().and_then(|path| string_at(item, path)),
            city_id: None,
            venue_name: fields.venue.as_deref().and_then(|path| string_at(item, path)),
            organizer_name: fields
                .organizer
                .as_deref()
                .and_then(|path| string_at(item, path)),
            description: fields
                .description
                .as_deref()
                .and_then(|path| string_at(item, path)),
            official_website: fields
                .website
                .as_deref()
                .and_then(|path| string_at(item, path)),
            ticket_url: fields
                .tickets
                .as_deref()
                .and_then(|path| string_at(item, path)),
            genres: fields
                .genres
                .as_deref()
                .map(|path| string_list_at(item, path))
                .unwrap_or_default(),
            artists: fields
                .artists
                .as_deref()
                .map(|path| string_list_at(item, path))
                .unwrap_or_default(),
        };
        Ok(finish_draft(&self.context, draft))
    }
}

/// Walk a dot-separated path into a JSON value.
pub(crate) fn value_at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

pub(crate) fn string_at(value: &Value, path: &str) -> Option<String> {
    match value_at(value, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A list field: either a JSON array of strings or one comma-joined string.
pub(crate) fn string_list_at(value: &Value, path: &str) -> Vec<String> {
    match value_at(value, path) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(joined)) => joined
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dot_paths_reach_nested_fields() {
        let value = json!({ "venue": { "city": { "name": "Essaouira" } } });
        assert_eq!(
            string_at(&value, "venue.city.name"),
            Some("Essaouira".to_string())
        );
        assert_eq!(string_at(&value, "venue.city.missing"), None);
    }

    #[test]
    fn list_fields_accept_arrays_and_joined_strings() {
        let value = json!({ "genres": ["Gnawa", "Jazz"], "artists": "Maalem Hamid, Snarky Puppy" });
        assert_eq!(string_list_at(&value, "genres"), vec!["Gnawa", "Jazz"]);
        assert_eq!(
            string_list_at(&value, "artists"),
            vec!["Maalem Hamid", "Snarky Puppy"]
        );
    }
}
