//! Catalog-facing track types.
//!
//! Tracks are owned by the host catalog; the engine only carries the metadata
//! it needs for ranking and diversity decisions and refers to everything else
//! by [`TrackId`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense content embedding for a track.
pub type Embedding = Vec<f32>;

/// Opaque external track identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TrackId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How a track is stored by the host and handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    #[serde(default)]
    pub title: String,
    /// Artist identifier used for diversity quotas and affinity counters.
    #[serde(default)]
    pub artist_id: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub explicit: bool,
}

impl Track {
    /// Minimal track with an id and an artist; the rest is left empty.
    #[must_use]
    pub fn new(id: impl Into<TrackId>, artist_id: impl Into<String>) -> Self {
        let artist_id = artist_id.into();
        Self {
            id: id.into(),
            title: String::new(),
            artist_name: artist_id.clone(),
            artist_id,
            genre: None,
            duration_ms: None,
            explicit: false,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    #[must_use]
    pub fn with_explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.title.is_empty() {
            write!(f, "{} ({})", self.id, self.artist_name)
        } else {
            write!(f, "{} - {}", self.artist_name, self.title)
        }
    }
}

/// A track together with the score an algorithm gave it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTrack {
    pub track: Track,
    pub score: f64,
}

impl ScoredTrack {
    #[must_use]
    pub fn new(track: Track, score: f64) -> Self {
        Self { track, score }
    }
}

/// Sort scored tracks best-first. NaN scores sink to the end.
pub fn sort_by_score_desc(tracks: &mut [ScoredTrack]) {
    tracks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or_else(|| a.score.is_nan().cmp(&b.score.is_nan()))
    });
}

/// What a radio station is seeded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedKind {
    Track,
    Artist,
    Genre,
}

/// Seed for the `radio` candidate source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioSeed {
    pub kind: SeedKind,
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl RadioSeed {
    #[must_use]
    pub fn track(track: &Track) -> Self {
        Self {
            kind: SeedKind::Track,
            id: track.id.0.clone(),
            name: track.title.clone(),
        }
    }

    #[must_use]
    pub fn artist(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: SeedKind::Artist,
            id: id.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn genre(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: SeedKind::Genre,
            id: name.clone(),
            name,
        }
    }
}
