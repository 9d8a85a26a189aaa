//! Spreadsheet-dump adapter. Rows arrive as untyped maps (an export dropped
//! under the data directory); column names are matched leniently and
//! booleans accept the spreadsheet literal set.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{finish_draft, CandidateDraft, NormalizerContext, RawPayload, RawRecord, SourceAdapter, SourceSpec};
use crate::common::error::{PipelineError, Result};
use crate::normalize::dates::parse_date;

pub struct SheetAdapter {
    spec: SourceSpec,
    context: Arc<NormalizerContext>,
    data_dir: PathBuf,
}

impl SheetAdapter {
    pub fn new(spec: SourceSpec, context: Arc<NormalizerContext>, data_dir: PathBuf) -> Self {
        Self {
            spec,
            context,
            data_dir,
        }
    }

    fn sheet_path(&self) -> PathBuf {
        self.data_dir
            .join("sheets")
            .join(format!("{}.json", self.spec.name))
    }
}

#[async_trait::async_trait]
impl SourceAdapter for SheetAdapter {
    fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<Vec<RawRecord>> {
        let path = self.sheet_path();
        if !path.exists() {
            debug!(source = %self.spec.name, path = %path.display(), "no sheet dump present");
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        let rows: Vec<HashMap<String, Value>> =
            serde_json::from_str(&content).map_err(|e| PipelineError::Parse {
                message: format!("{}: sheet dump is not a row array: {e}", self.spec.name),
            })?;

        let fetched_at = Utc::now();
        let records = rows
            .into_iter()
            .map(|row| {
                let external_id = row
                    .get("id")
                    .or_else(|| row.get("external_id"))
                    .and_then(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .unwrap_or_else(|| {
                        let digest = Sha256::digest(
                            serde_json::to_string(&row).unwrap_or_default().as_bytes(),
                        );
                        hex::encode(&digest[..8])
                    });
                RawRecord {
                    external_id,
                    source_url: row
                        .get("source_url")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                    payload: RawPayload::Row(row),
                    fetched_at,
                }
            })
            .collect();
        Ok(records)
    }

    fn normalize(&self, raw: &RawRecord) -> Result<CandidateDraft> {
        let RawPayload::Row(row) = &raw.payload else {
            return Err(PipelineError::Parse {
                message: format!("{}: expected row payload", self.spec.name),
            });
        };

        let raw_name = cell(row, &["name", "nom", "event", "title"]).ok_or_else(|| {
            PipelineError::Validation {
                message: format!("{}: row {} has no name", self.spec.name, raw.external_id),
            }
        })?;
        let start_date = cell(row, &["start_date", "date", "date_debut"])
            .map(|s| parse_date(&s))
            .transpose()?;
        let end_date = cell(row, &["end_date", "date_fin"]).and_then(|s| parse_date(&s).ok());
        let event_type = cell(row, &["event_type", "type"])
            .and_then(|s| s.to_lowercase().parse().ok())
            .or(self.spec.default_event_type)
            .unwrap_or(moussem_core::domain::EventType::Festival);
        let has_tickets = cell_value(row, &["has_tickets", "tickets", "billetterie"])
            .and_then(coerce_bool)
            .unwrap_or(false);

        let draft = CandidateDraft {
            external_id: Some(raw.external_id.clone()),
            source_url: raw.source_url.clone(),
            raw_payload: raw.payload.to_value(),
            raw_name,
            normalized_name: String::new(),
            event_type,
            start_date,
            end_date,
            raw_city: cell(row, &["city", "ville", "location"]),
            city_id: None,
            venue_name: cell(row, &["venue", "lieu", "salle"]),
            organizer_name: cell(row, &["organizer", "organisateur"]),
            description: cell(row, &["description", "notes"]),
            official_website: cell(row, &["website", "official_website", "site"]),
            ticket_url: cell(row, &["ticket_url", "lien_billetterie"]).or_else(|| {
                // Boolean-only ticket columns still feed has_tickets.
                has_tickets.then(|| String::new())
            }),
            genres: cell(row, &["genres", "genre"])
                .map(|joined| {
                    joined
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            artists: cell(row, &["artists", "artistes", "lineup"])
                .map(|joined| {
                    joined
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };
        Ok(finish_draft(&self.context, draft))
    }
}

fn cell_value<'a>(row: &'a HashMap<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    for key in keys {
        for (column, value) in row {
            if column.trim().eq_ignore_ascii_case(key) && !value.is_null() {
                return Some(value);
            }
        }
    }
    None
}

fn cell(row: &HashMap<String, Value>, keys: &[&str]) -> Option<String> {
    match cell_value(row, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Spreadsheet boolean coercion: exactly {TRUE, FALSE, Yes, No, 1, 0, true,
/// false}. Anything else is not a boolean.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "TRUE" | "Yes" | "1" | "true" => Some(true),
            "FALSE" | "No" | "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_the_spreadsheet_boolean_literals() {
        for (raw, expected) in [
            (json!("TRUE"), Some(true)),
            (json!("FALSE"), Some(false)),
            (json!("Yes"), Some(true)),
            (json!("No"), Some(false)),
            (json!("1"), Some(true)),
            (json!("0"), Some(false)),
            (json!("true"), Some(true)),
            (json!("false"), Some(false)),
            (json!(1), Some(true)),
            (json!(0), Some(false)),
            (json!(true), Some(true)),
            (json!("oui"), None),
            (json!("TRUE "), Some(true)),
            (json!(2), None),
        ] {
            assert_eq!(coerce_bool(&raw), expected, "input {raw:?}");
        }
    }

    #[test]
    fn cells_match_column_names_leniently() {
        let row: HashMap<String, Value> = [
            ("Name".to_string(), json!("Moussem d'Asilah")),
            ("VILLE".to_string(), json!("Asilah")),
        ]
        .into_iter()
        .collect();
        assert_eq!(cell(&row, &["name"]), Some("Moussem d'Asilah".to_string()));
        assert_eq!(cell(&row, &["city", "ville"]), Some("Asilah".to_string()));
    }
}
