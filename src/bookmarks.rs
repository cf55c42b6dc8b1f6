use crate::ids::{BookmarkId, UserId};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    hash::Hash,
    io::ErrorKind,
    path::PathBuf,
    str::FromStr,
    sync::{Arc, RwLock},
    time::{Instant, SystemTime},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkType {
    Link,
    Article,
    Video,
    Image,
}

impl BookmarkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookmarkType::Link => "link",
            BookmarkType::Article => "article",
            BookmarkType::Video => "video",
            BookmarkType::Image => "image",
        }
    }
}

impl FromStr for BookmarkType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "link" => Ok(BookmarkType::Link),
            "article" => Ok(BookmarkType::Article),
            "video" => Ok(BookmarkType::Video),
            "image" => Ok(BookmarkType::Image),
            other => anyhow::bail!("unknown bookmark type {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRef {
    pub id: String,
    pub name: String,
    pub emoji: Option<String>,
}

/// A saved item as seen by search. Search never mutates bookmarks.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub owner: UserId,
    #[serde(rename = "type")]
    pub kind: BookmarkType,

    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub platform: Option<String>,
    pub folder: Option<FolderRef>,
    pub cover_image: Option<String>,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,

    pub tags: Vec<String>,
    /// Text extracted from the source, if the extraction pipeline produced any.
    pub content: Option<String>,
}

impl Hash for Bookmark {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Bookmark {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkFilter {
    pub folder_id: Option<String>,
    pub kind: Option<BookmarkType>,
}

impl BookmarkFilter {
    pub fn matches(&self, bmark: &Bookmark) -> bool {
        if let Some(folder_id) = &self.folder_id {
            if bmark.folder.as_ref().map(|f| &f.id) != Some(folder_id) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if bmark.kind != kind {
                return false;
            }
        }
        true
    }
}

/// Read access to the bookmark content store, scoped by owner.
pub trait BookmarkStore: Send + Sync {
    fn list_for_owner(
        &self,
        owner: &UserId,
        filter: &BookmarkFilter,
    ) -> anyhow::Result<Vec<Bookmark>>;
}

const CSV_HEADERS: [&str; 15] = [
    "id",
    "owner",
    "type",
    "title",
    "description",
    "url",
    "platform",
    "folder_id",
    "folder_name",
    "folder_emoji",
    "cover_image",
    "is_favorite",
    "created_at",
    "tags",
    "content",
];

#[derive(Debug, Deserialize, Serialize)]
struct CsvRecord {
    id: String,
    owner: String,
    #[serde(rename = "type")]
    kind: String,
    title: String,
    description: String,
    url: String,
    platform: String,
    folder_id: String,
    folder_name: String,
    folder_emoji: String,
    cover_image: String,
    is_favorite: String,
    created_at: String,
    tags: String,
    content: String,
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl TryFrom<CsvRecord> for Bookmark {
    type Error = anyhow::Error;

    fn try_from(record: CsvRecord) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_rfc3339(record.created_at.trim())
            .with_context(|| format!("bad created_at for bookmark {}", record.id))?
            .with_timezone(&Utc);

        let folder = non_empty(record.folder_id).map(|id| FolderRef {
            id,
            name: record.folder_name,
            emoji: non_empty(record.folder_emoji),
        });

        Ok(Bookmark {
            id: record.id.into(),
            owner: record.owner.into(),
            kind: record.kind.parse()?,
            title: record.title,
            description: non_empty(record.description),
            url: non_empty(record.url),
            platform: non_empty(record.platform),
            folder,
            cover_image: non_empty(record.cover_image),
            is_favorite: matches!(record.is_favorite.trim(), "true" | "1"),
            created_at,
            tags: record
                .tags
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            content: non_empty(record.content),
        })
    }
}

impl From<&Bookmark> for CsvRecord {
    fn from(bmark: &Bookmark) -> Self {
        CsvRecord {
            id: bmark.id.to_string(),
            owner: bmark.owner.to_string(),
            kind: bmark.kind.as_str().to_string(),
            title: bmark.title.clone(),
            description: bmark.description.clone().unwrap_or_default(),
            url: bmark.url.clone().unwrap_or_default(),
            platform: bmark.platform.clone().unwrap_or_default(),
            folder_id: bmark.folder.as_ref().map(|f| f.id.clone()).unwrap_or_default(),
            folder_name: bmark
                .folder
                .as_ref()
                .map(|f| f.name.clone())
                .unwrap_or_default(),
            folder_emoji: bmark
                .folder
                .as_ref()
                .and_then(|f| f.emoji.clone())
                .unwrap_or_default(),
            cover_image: bmark.cover_image.clone().unwrap_or_default(),
            is_favorite: bmark.is_favorite.to_string(),
            created_at: bmark.created_at.to_rfc3339(),
            tags: bmark.tags.join(","),
            content: bmark.content.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    modified: Option<SystemTime>,
    list: Arc<Vec<Bookmark>>,
}

/// Read-only bookmark store over the CSV export written by the bookmark service.
///
/// The file is re-read whenever its modification time changes, so edits made
/// by the CRUD side become visible without a restart.
#[derive(Debug, Clone)]
pub struct BackendCsv {
    snapshot: Arc<RwLock<Snapshot>>,
    path: PathBuf,
}

impl BackendCsv {
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let mgr = BackendCsv {
            snapshot: Arc::new(RwLock::new(Snapshot::default())),
            path: path.into(),
        };
        mgr.refresh()?;
        Ok(mgr)
    }

    fn modified(&self) -> anyhow::Result<Option<SystemTime>> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn read_all(&self) -> anyhow::Result<Vec<Bookmark>> {
        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;

        let mut bmarks = vec![];
        for record in csv_reader.deserialize::<CsvRecord>() {
            bmarks.push(Bookmark::try_from(record?)?);
        }

        log::debug!(
            "took {}ms to read csv",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        Ok(bmarks)
    }

    /// Re-reads the file if it changed since the last read.
    fn refresh(&self) -> anyhow::Result<Arc<Vec<Bookmark>>> {
        let modified = self.modified()?;

        {
            let snapshot = self
                .snapshot
                .read()
                .map_err(|_| anyhow::anyhow!("bookmark snapshot lock poisoned"))?;
            if snapshot.modified == modified {
                return Ok(snapshot.list.clone());
            }
        }

        let list = match modified {
            Some(_) => Arc::new(self.read_all()?),
            None => {
                log::info!("no bookmark file at {}, serving empty store", self.path.display());
                Arc::new(vec![])
            }
        };

        let mut snapshot = self
            .snapshot
            .write()
            .map_err(|_| anyhow::anyhow!("bookmark snapshot lock poisoned"))?;
        *snapshot = Snapshot {
            modified,
            list: list.clone(),
        };

        Ok(list)
    }

    #[cfg(test)]
    pub fn write_all(path: &std::path::Path, bmarks: &[Bookmark]) -> anyhow::Result<()> {
        let mut csv_wrt = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        csv_wrt.write_record(CSV_HEADERS)?;
        for bmark in bmarks {
            csv_wrt.serialize(CsvRecord::from(bmark))?;
        }
        csv_wrt.flush()?;
        Ok(())
    }
}

impl BookmarkStore for BackendCsv {
    fn list_for_owner(
        &self,
        owner: &UserId,
        filter: &BookmarkFilter,
    ) -> anyhow::Result<Vec<Bookmark>> {
        let list = self.refresh()?;

        Ok(list
            .iter()
            .filter(|bmark| &bmark.owner == owner && filter.matches(bmark))
            .cloned()
            .collect())
    }
}
