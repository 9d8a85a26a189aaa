//! Authoritative store schema and fixed reference data.
//!
//! Cities and regions are the Moroccan administrative hierarchy; they are
//! seeded once and treated as stable rows. Aliases carry the spelling
//! variants the normalizer matches against.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS regions (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    slug TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS cities (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    region_id INTEGER NOT NULL REFERENCES regions(id),
    latitude REAL NOT NULL,
    longitude REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS city_aliases (
    city_id INTEGER NOT NULL REFERENCES cities(id),
    alias TEXT NOT NULL,
    PRIMARY KEY (city_id, alias)
);

CREATE TABLE IF NOT EXISTS venues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    city_id INTEGER NOT NULL REFERENCES cities(id),
    address TEXT
);

CREATE TABLE IF NOT EXISTS organizers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    website TEXT
);

CREATE TABLE IF NOT EXISTS genres (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    slug TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS genre_aliases (
    genre_id INTEGER NOT NULL REFERENCES genres(id),
    alias TEXT NOT NULL,
    PRIMARY KEY (genre_id, alias)
);

CREATE TABLE IF NOT EXISTS artists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL,
    name TEXT NOT NULL,
    event_type TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT,
    city_id INTEGER NOT NULL REFERENCES cities(id),
    region_id INTEGER NOT NULL REFERENCES regions(id),
    venue_id INTEGER REFERENCES venues(id),
    organizer_id INTEGER REFERENCES organizers(id),
    description TEXT,
    official_website TEXT,
    ticket_url TEXT,
    status TEXT NOT NULL DEFAULT 'announced',
    is_verified INTEGER NOT NULL DEFAULT 0,
    is_pinned INTEGER NOT NULL DEFAULT 0,
    cultural_significance INTEGER NOT NULL DEFAULT 0,
    confidence_score REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_verified_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_events_status ON events(status);
CREATE INDEX IF NOT EXISTS idx_events_start_date ON events(start_date);
CREATE INDEX IF NOT EXISTS idx_events_slug ON events(slug);

CREATE TABLE IF NOT EXISTS event_genres (
    event_id INTEGER NOT NULL REFERENCES events(id),
    genre_id INTEGER NOT NULL REFERENCES genres(id),
    PRIMARY KEY (event_id, genre_id)
);

CREATE TABLE IF NOT EXISTS event_artists (
    event_id INTEGER NOT NULL REFERENCES events(id),
    artist_id INTEGER NOT NULL REFERENCES artists(id),
    PRIMARY KEY (event_id, artist_id)
);

CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    source_type TEXT NOT NULL,
    reliability_score REAL NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_fetch_at TEXT,
    accuracy_score REAL
);

CREATE TABLE IF NOT EXISTS event_sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events(id),
    source_id INTEGER NOT NULL REFERENCES sources(id),
    external_id TEXT,
    source_url TEXT,
    raw_payload TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    reported_start_date TEXT,
    reported_venue TEXT
);
CREATE INDEX IF NOT EXISTS idx_event_sources_event ON event_sources(event_id);

CREATE TABLE IF NOT EXISTS candidates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id),
    external_id TEXT,
    source_url TEXT,
    raw_payload TEXT NOT NULL,
    raw_name TEXT NOT NULL,
    normalized_name TEXT NOT NULL,
    event_type TEXT NOT NULL,
    start_date TEXT,
    end_date TEXT,
    raw_city TEXT,
    city_id INTEGER,
    venue_name TEXT,
    organizer_name TEXT,
    description TEXT,
    official_website TEXT,
    ticket_url TEXT,
    genres TEXT NOT NULL DEFAULT '[]',
    artists TEXT NOT NULL DEFAULT '[]',
    processed INTEGER NOT NULL DEFAULT 0,
    outcome TEXT,
    matched_event_id INTEGER,
    match_confidence REAL,
    ingested_at TEXT NOT NULL,
    processed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_candidates_processed ON candidates(processed, ingested_at);
CREATE INDEX IF NOT EXISTS idx_candidates_outcome ON candidates(outcome);

CREATE TABLE IF NOT EXISTS fingerprints (
    kind TEXT NOT NULL,
    hash TEXT NOT NULL,
    event_id INTEGER NOT NULL REFERENCES events(id),
    PRIMARY KEY (kind, hash, event_id)
);
CREATE INDEX IF NOT EXISTS idx_fingerprints_event ON fingerprints(event_id);

CREATE TABLE IF NOT EXISTS editorial_actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    action_type TEXT NOT NULL,
    event_id INTEGER NOT NULL,
    actor TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS event_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL,
    snapshot TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

pub const SEEDS: &str = r#"
INSERT OR IGNORE INTO regions (id, name, slug) VALUES
    (1, 'Tanger-Tétouan-Al Hoceïma', 'tanger-tetouan-al-hoceima'),
    (2, 'L''Oriental', 'oriental'),
    (3, 'Fès-Meknès', 'fes-meknes'),
    (4, 'Rabat-Salé-Kénitra', 'rabat-sale-kenitra'),
    (5, 'Béni Mellal-Khénifra', 'beni-mellal-khenifra'),
    (6, 'Casablanca-Settat', 'casablanca-settat'),
    (7, 'Marrakech-Safi', 'marrakech-safi'),
    (8, 'Drâa-Tafilalet', 'draa-tafilalet'),
    (9, 'Souss-Massa', 'souss-massa'),
    (10, 'Guelmim-Oued Noun', 'guelmim-oued-noun'),
    (11, 'Laâyoune-Sakia El Hamra', 'laayoune-sakia-el-hamra'),
    (12, 'Dakhla-Oued Ed-Dahab', 'dakhla-oued-ed-dahab');

INSERT OR IGNORE INTO cities (id, name, slug, region_id, latitude, longitude) VALUES
    (1, 'Tanger', 'tanger', 1, 35.7595, -5.8340),
    (2, 'Tétouan', 'tetouan', 1, 35.5889, -5.3626),
    (3, 'Chefchaouen', 'chefchaouen', 1, 35.1688, -5.2636),
    (4, 'Larache', 'larache', 1, 35.1932, -6.1557),
    (5, 'Asilah', 'asilah', 1, 35.4656, -6.0347),
    (6, 'Al Hoceïma', 'al-hoceima', 1, 35.2517, -3.9372),
    (7, 'Oujda', 'oujda', 2, 34.6814, -1.9086),
    (8, 'Nador', 'nador', 2, 35.1681, -2.9335),
    (9, 'Berkane', 'berkane', 2, 34.9218, -2.3200),
    (10, 'Fès', 'fes', 3, 34.0181, -5.0078),
    (11, 'Meknès', 'meknes', 3, 33.8935, -5.5473),
    (12, 'Ifrane', 'ifrane', 3, 33.5228, -5.1106),
    (13, 'Taza', 'taza', 3, 34.2133, -4.0103),
    (14, 'Rabat', 'rabat', 4, 34.0209, -6.8416),
    (15, 'Salé', 'sale', 4, 34.0531, -6.7985),
    (16, 'Kénitra', 'kenitra', 4, 34.2610, -6.5802),
    (17, 'Béni Mellal', 'beni-mellal', 5, 32.3373, -6.3498),
    (18, 'Khénifra', 'khenifra', 5, 32.9340, -5.6675),
    (19, 'Khouribga', 'khouribga', 5, 32.8811, -6.9063),
    (20, 'Casablanca', 'casablanca', 6, 33.5731, -7.5898),
    (21, 'Mohammedia', 'mohammedia', 6, 33.6866, -7.3830),
    (22, 'El Jadida', 'el-jadida', 6, 33.2316, -8.5007),
    (23, 'Settat', 'settat', 6, 33.0010, -7.6166),
    (24, 'Marrakech', 'marrakech', 7, 31.6295, -7.9811),
    (25, 'Essaouira', 'essaouira', 7, 31.5085, -9.7595),
    (26, 'Safi', 'safi', 7, 32.2994, -9.2372),
    (27, 'Ouarzazate', 'ouarzazate', 8, 30.9189, -6.8934),
    (28, 'Errachidia', 'errachidia', 8, 31.9314, -4.4246),
    (29, 'Zagora', 'zagora', 8, 30.3306, -5.8381),
    (30, 'Merzouga', 'merzouga', 8, 31.0802, -4.0135),
    (31, 'Midelt', 'midelt', 8, 32.6852, -4.7371),
    (32, 'Agadir', 'agadir', 9, 30.4278, -9.5981),
    (33, 'Taroudant', 'taroudant', 9, 30.4703, -8.8766),
    (34, 'Tiznit', 'tiznit', 9, 29.6974, -9.7316),
    (35, 'Guelmim', 'guelmim', 10, 28.9870, -10.0574),
    (36, 'Sidi Ifni', 'sidi-ifni', 10, 29.3797, -10.1728),
    (37, 'Laâyoune', 'laayoune', 11, 27.1253, -13.1625),
    (38, 'Dakhla', 'dakhla', 12, 23.6848, -15.9580);

INSERT OR IGNORE INTO city_aliases (city_id, alias) VALUES
    (1, 'tangier'),
    (1, 'tangiers'),
    (1, 'tanger'),
    (2, 'tetuan'),
    (3, 'chaouen'),
    (5, 'arzila'),
    (6, 'alhucemas'),
    (10, 'fez'),
    (10, 'fes el bali'),
    (11, 'mequinez'),
    (20, 'casa'),
    (22, 'mazagan'),
    (24, 'marrakesh'),
    (24, 'marrakec'),
    (25, 'mogador'),
    (37, 'el aaiun');

INSERT OR IGNORE INTO genres (id, name, slug) VALUES
    (1, 'Gnawa', 'gnawa'),
    (2, 'Chaabi', 'chaabi'),
    (3, 'Raï', 'rai'),
    (4, 'Andalusi', 'andalusi'),
    (5, 'Amazigh', 'amazigh'),
    (6, 'Ahidous', 'ahidous'),
    (7, 'Ahwash', 'ahwash'),
    (8, 'Sufi', 'sufi'),
    (9, 'Malhun', 'malhun'),
    (10, 'Aïta', 'aita'),
    (11, 'Reggada', 'reggada'),
    (12, 'Jazz', 'jazz'),
    (13, 'Electronic', 'electronic'),
    (14, 'Hip-Hop', 'hip-hop'),
    (15, 'Rock', 'rock'),
    (16, 'Fusion', 'fusion'),
    (17, 'World', 'world'),
    (18, 'Classical', 'classical');

INSERT OR IGNORE INTO genre_aliases (genre_id, alias) VALUES
    (1, 'gnaoua'),
    (1, 'gnawa music'),
    (2, 'shaabi'),
    (2, 'cha3bi'),
    (3, 'rai'),
    (4, 'arabo-andalusian'),
    (4, 'andalou'),
    (4, 'andalousi'),
    (5, 'berber'),
    (5, 'tamazight'),
    (8, 'soufi'),
    (9, 'melhoun'),
    (10, 'aita'),
    (13, 'electro'),
    (14, 'hip hop'),
    (14, 'rap'),
    (17, 'world music'),
    (18, 'classique');
"#;
