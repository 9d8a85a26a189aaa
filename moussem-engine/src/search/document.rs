use chrono::Datelike;
use serde::{Deserialize, Serialize};

use moussem_core::catalog::events::EventRecord;

/// The read-optimized projection of one event. Denormalized reference names
/// are materialized here and nowhere else — the event row stays the single
/// source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDocument {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unix seconds at midnight UTC of the start date.
    pub start_date: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<i64>,
    pub year: i32,
    pub month: i32,
    pub city_id: i32,
    pub region_id: i32,
    pub city_name: String,
    pub region_name: String,
    pub city_slug: String,
    pub region_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<[f64; 2]>,
    pub genres: Vec<String>,
    pub genre_slugs: Vec<String>,
    pub artists: Vec<String>,
    pub artist_slugs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub official_website: Option<String>,
    pub status: String,
    pub confidence_score: f64,
    pub is_verified: bool,
    pub is_pinned: bool,
    pub cultural_significance: i32,
    pub has_tickets: bool,
    pub updated_at: i64,
}

fn day_to_unix(date: chrono::NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

impl EventDocument {
    pub fn from_record(record: &EventRecord) -> Self {
        let event = &record.event;
        Self {
            id: event.id.unwrap_or_default().to_string(),
            name: event.name.clone(),
            slug: event.slug.clone(),
            event_type: event.event_type.as_str().to_string(),
            description: event.description.clone(),
            start_date: day_to_unix(event.start_date),
            end_date: event.end_date.map(day_to_unix),
            year: event.start_date.year(),
            month: event.start_date.month() as i32,
            city_id: record.city.id as i32,
            region_id: record.region.id as i32,
            city_name: record.city.name.clone(),
            region_name: record.region.name.clone(),
            city_slug: record.city.slug.clone(),
            region_slug: record.region.slug.clone(),
            venue_name: record.venue.as_ref().map(|v| v.name.clone()),
            venue_slug: record.venue.as_ref().map(|v| v.slug.clone()),
            geo_location: Some([record.city.latitude, record.city.longitude]),
            genres: record.genres.iter().map(|g| g.name.clone()).collect(),
            genre_slugs: record.genres.iter().map(|g| g.slug.clone()).collect(),
            artists: record.artists.iter().map(|a| a.name.clone()).collect(),
            artist_slugs: record.artists.iter().map(|a| a.slug.clone()).collect(),
            organizer_name: record.organizer.as_ref().map(|o| o.name.clone()),
            official_website: event.official_website.clone(),
            status: event.status.as_str().to_string(),
            confidence_score: event.confidence_score,
            is_verified: event.is_verified,
            is_pinned: event.is_pinned,
            cultural_significance: event.cultural_significance as i32,
            has_tickets: event.ticket_url.is_some(),
            updated_at: event.updated_at.timestamp(),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use moussem_core::domain::{City, Event, EventStatus, EventType, Genre, Region};

    fn record() -> EventRecord {
        let start = NaiveDate::from_ymd_opt(2025, 6, 26).unwrap();
        EventRecord {
            event: Event {
                id: Some(42),
                slug: "festival-gnaoua-2025".to_string(),
                name: "Festival Gnaoua et Musiques du Monde".to_string(),
                event_type: EventType::Festival,
                start_date: start,
                end_date: NaiveDate::from_ymd_opt(2025, 6, 28),
                city_id: 25,
                region_id: 7,
                venue_id: None,
                organizer_id: None,
                description: None,
                official_website: Some("https://festival-gnaoua.net".to_string()),
                ticket_url: Some("https://tickets.example/gnaoua".to_string()),
                status: EventStatus::Confirmed,
                is_verified: true,
                is_pinned: false,
                cultural_significance: 9,
                confidence_score: 0.91,
                created_at: Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap(),
                updated_at: Utc.with_ymd_and_hms(2025, 5, 2, 9, 30, 0).unwrap(),
                last_verified_at: None,
            },
            city: City {
                id: 25,
                name: "Essaouira".to_string(),
                slug: "essaouira".to_string(),
                region_id: 7,
                latitude: 31.5085,
                longitude: -9.7595,
            },
            region: Region {
                id: 7,
                name: "Marrakech-Safi".to_string(),
                slug: "marrakech-safi".to_string(),
            },
            venue: None,
            organizer: None,
            genres: vec![Genre {
                id: Some(1),
                name: "Gnawa".to_string(),
                slug: "gnawa".to_string(),
            }],
            artists: vec![],
        }
    }

    #[test]
    fn transform_derives_projection_fields() {
        let doc = EventDocument::from_record(&record());
        assert_eq!(doc.id, "42");
        assert_eq!(doc.year, 2025);
        assert_eq!(doc.month, 6);
        // 2025-06-26T00:00:00Z
        assert_eq!(doc.start_date, 1_750_896_000);
        assert!(doc.has_tickets);
        assert_eq!(doc.geo_location, Some([31.5085, -9.7595]));
        assert_eq!(doc.genres, vec!["Gnawa".to_string()]);
        assert_eq!(doc.city_name, "Essaouira");
        assert_eq!(doc.status, "confirmed");
    }

    #[test]
    fn optional_fields_are_dropped_from_json() {
        let doc = EventDocument::from_record(&record());
        let value = doc.to_value();
        assert!(value.get("description").is_none());
        assert!(value.get("venue_name").is_none());
        assert_eq!(value["official_website"], "https://festival-gnaoua.net");
    }
}
