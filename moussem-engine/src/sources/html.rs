//! Scraped-page adapter: CSS selectors from the source spec pull one record
//! per matching element.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{finish_draft, CandidateDraft, NormalizerContext, RawPayload, RawRecord, SourceAdapter, SourceSpec};
use crate::common::error::{PipelineError, Result};
use crate::normalize::dates::parse_date_range;

pub struct ScrapeAdapter {
    spec: SourceSpec,
    mapping: super::ScrapeMapping,
    context: Arc<NormalizerContext>,
    client: reqwest::Client,
}

impl ScrapeAdapter {
    pub fn new(spec: SourceSpec, context: Arc<NormalizerContext>) -> Result<Self> {
        let mapping = spec.scrape.clone().ok_or_else(|| PipelineError::Validation {
            message: format!("scrape source '{}' has no selector mapping", spec.name),
        })?;
        if spec.endpoints.is_empty() {
            return Err(PipelineError::Validation {
                message: format!("scrape source '{}' has no endpoint", spec.name),
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
            mapping,
            context,
            client,
        })
    }

    fn selector(&self, css: &str) -> Result<Selector> {
        Selector::parse(css).map_err(|e| PipelineError::Parse {
            message: format!("{}: bad selector '{css}': {e:?}", self.spec.name),
        })
    }
}

#[async_trait::async_trait]
impl SourceAdapter for ScrapeAdapter {
    fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<Vec<RawRecord>> {
        let endpoint = &self.spec.endpoints[0];
        let response = self
            .client
            .get(&endpoint.url)
            .send()
            .await
            .map_err(|e| PipelineError::from_http(&self.spec.name, e))?;
        if !response.status().is_success() {
            return Err(PipelineError::SourceUnavailable {
                message: format!("{}: HTTP {}", self.spec.name, response.status()),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::from_http(&self.spec.name, e))?;

        // `Html` is not Send; parse and drop it before anything awaits.
        let record_selector = self.selector(&self.mapping.record_selector)?;
        let fragments: Vec<String> = {
            let document = Html::parse_document(&body);
            document
                .select(&record_selector)
                .map(|element| element.html())
                .collect()
        };

        let fetched_at = Utc::now();
        let records: Vec<RawRecord> = fragments
            .into_iter()
            .map(|fragment| {
                // Content-addressed id keeps re-fetches idempotent.
                let digest = Sha256::digest(fragment.as_bytes());
                RawRecord {
                    external_id: hex::encode(&digest[..8]),
                    source_url: Some(endpoint.url.clone()),
                    payload: RawPayload::Html(fragment),
                    fetched_at,
                }
            })
            .collect();
        debug!(source = %self.spec.name, count = records.len(), "scraped records");
        Ok(records)
    }

    fn normalize(&self, raw: &RawRecord) -> Result<CandidateDraft> {
        let RawPayload::Html(fragment) = &raw.payload else {
            return Err(PipelineError::Parse {
                message: format!("{}: expected HTML payload", self.spec.name),
            });
        };
        let mapping = &self.mapping;
        let document = Html::parse_fragment(fragment);

        let text_of = |css: &str| -> Result<Option<String>> {
            let selector = self.selector(css)?;
            let text = document.select(&selector).next().map(|element| {
                element
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            });
            Ok(text.filter(|t| !t.is_empty()))
        };

        let raw_name = text_of(&mapping.name_selector)?.ok_or_else(|| PipelineError::Parse {
            message: format!("{}: record {} has no name", self.spec.name, raw.external_id),
        })?;
        // Pages print ranges ("du 26 au 28 juin 2025") as often as single
        // dates.
        let (start_date, end_date) = match text_of(&mapping.date_selector)? {
            Some(text) => {
                let (start, end) = parse_date_range(&text)?;
                (Some(start), end)
            }
            None => (None, None),
        };
        let raw_city = match mapping.city_selector.as_deref() {
            Some(css) => text_of(css)?,
            None => None,
        }
        .or_else(|| mapping.default_city.clone());
        let venue_name = match mapping.venue_selector.as_deref() {
            Some(css) => text_of(css)?,
            None => None,
        };
        let source_url = match mapping.url_selector.as_deref() {
            Some(css) => {
                let selector = self.selector(css)?;
                document
                    .select(&selector)
                    .next()
                    .and_then(|element| element.value().attr("href"))
                    .map(|href| href.to_string())
            }
            None => None,
        }
        .or_else(|| raw.source_url.clone());

        let event_type = mapping
            .default_event_type
            .or(self.spec.default_event_type)
            .unwrap_or(moussem_core::domain::EventType::Concert);

        let draft = CandidateDraft {
            external_id: Some(raw.external_id.clone()),
            source_url,
            raw_payload: raw.payload.to_value(),
            raw_name,
            normalized_name: String::new(),
            event_type,
            start_date,
            end_date,
            raw_city,
            city_id: None,
            venue_name,
            organizer_name: None,
            description: None,
            official_website: None,
            ticket_url: None,
            genres: Vec::new(),
            artists: Vec::new(),
        };
        Ok(finish_draft(&self.context, draft))
    }
}
