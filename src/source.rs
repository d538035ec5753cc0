//! Remote table access.
//!
//! [`TableSource`] is the seam between the loader and the lake: it hands back
//! the raw product table as a polars `DataFrame`, untouched apart from the
//! column projection. [`HudiTableSource`] resolves the latest snapshot of a
//! Hudi table from its `.hoodie` timeline and scans the chosen base files
//! with the polars parquet reader.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use polars::io::cloud::CloudOptions;
use polars::io::HiveOptions;
use polars::prelude::*;
use tracing::{debug, info, warn};
use url::Url;

use crate::credentials::AwsCredentials;
use crate::error::ShelfError;

pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = Result<DataFrame, ShelfError>> + Send + 'a>>;

/// Everything a source needs for one read.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub uri: String,
    pub region: String,
    pub credentials: AwsCredentials,
    /// Columns to project; sources may return more, never fewer.
    pub columns: Vec<String>,
}

pub trait TableSource: Send + Sync {
    fn read<'a>(&'a self, request: &'a ReadRequest) -> ReadFuture<'a>;
}

const METAFOLDER: &str = ".hoodie";
const PROPERTIES_FILE: &str = "hoodie.properties";
const BASE_FILE_SUFFIX: &str = ".parquet";

/// Last table version that keeps its instants directly under `.hoodie/`.
const MAX_TABLE_VERSION: u32 = 7;

/// Reads the latest snapshot of a Hudi table from object storage or a local
/// directory.
///
/// Only base files are read. On merge-on-read tables this is the
/// read-optimized view: updates still sitting in log files are not merged.
#[derive(Debug, Default, Clone, Copy)]
pub struct HudiTableSource;

impl TableSource for HudiTableSource {
    fn read<'a>(&'a self, request: &'a ReadRequest) -> ReadFuture<'a> {
        Box::pin(async move {
            let options = request.credentials.storage_options(&request.region);
            let table = HudiTable::open(&request.uri, &options)?;
            info!("Opening Hudi table {}", request.uri);

            let properties = table.properties().await?;
            table.check_supported(&properties)?;

            let timeline = table.timeline().await?;
            let replaced = table.replaced_file_groups(&timeline).await?;
            let files = latest_base_files(table.base_files().await?, &timeline, &replaced);
            debug!(
                "Snapshot of {} has {} base file(s) across {} committed instant(s)",
                request.uri,
                files.len(),
                timeline.completed.len()
            );

            table.scan(&files, &options, &request.columns).await
        })
    }
}

struct HudiTable {
    uri: String,
    url: Url,
    store: Box<dyn ObjectStore>,
    base: Path,
}

impl HudiTable {
    fn open(uri: &str, options: &[(String, String)]) -> Result<Self, ShelfError> {
        let unreachable = |reason: String| ShelfError::DataSourceUnreachable {
            uri: uri.to_string(),
            reason,
        };

        let url = if uri.contains("://") {
            Url::parse(uri).map_err(|e| unreachable(format!("invalid table URI: {e}")))?
        } else {
            let absolute = std::path::absolute(uri)?;
            Url::from_directory_path(&absolute)
                .map_err(|_| unreachable(format!("invalid table path {}", absolute.display())))?
        };

        let (store, base) = object_store::parse_url_opts(&url, options.iter().cloned())
            .map_err(|e| unreachable(e.to_string()))?;

        Ok(Self {
            uri: uri.to_string(),
            url,
            store,
            base,
        })
    }

    fn unreachable(&self, reason: impl Into<String>) -> ShelfError {
        ShelfError::DataSourceUnreachable {
            uri: self.uri.clone(),
            reason: reason.into(),
        }
    }

    fn metafolder(&self) -> Path {
        self.base.child(METAFOLDER)
    }

    /// The location polars is given for one object.
    fn object_uri(&self, location: &Path) -> String {
        match self.url.host_str() {
            Some(host) if self.url.scheme() != "file" => {
                format!("{}://{}/{}", self.url.scheme(), host, location)
            }
            _ => format!("/{location}"),
        }
    }

    async fn read_text(&self, location: &Path) -> Result<String, object_store::Error> {
        let bytes = self.store.get(location).await?.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn properties(&self) -> Result<HashMap<String, String>, ShelfError> {
        let location = self.metafolder().child(PROPERTIES_FILE);
        match self.read_text(&location).await {
            Ok(text) => Ok(parse_properties(&text)),
            Err(object_store::Error::NotFound { .. }) => Err(self.unreachable(format!(
                "not a Hudi table: {METAFOLDER}/{PROPERTIES_FILE} is missing"
            ))),
            Err(e) => Err(self.unreachable(e.to_string())),
        }
    }

    fn check_supported(&self, properties: &HashMap<String, String>) -> Result<(), ShelfError> {
        let version = properties
            .get("hoodie.table.version")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(0);
        if version > MAX_TABLE_VERSION {
            return Err(self.unreachable(format!("unsupported Hudi table version {version}")));
        }

        if properties.get("hoodie.table.type").map(String::as_str) == Some("MERGE_ON_READ") {
            warn!(
                "{} is merge-on-read; reading base files only, log files are not merged",
                self.uri
            );
        }
        Ok(())
    }

    async fn timeline(&self) -> Result<Timeline, ShelfError> {
        let listing = self
            .store
            .list_with_delimiter(Some(&self.metafolder()))
            .await
            .map_err(|e| self.unreachable(format!("list timeline: {e}")))?;

        let instants = listing
            .objects
            .iter()
            .filter_map(|meta| meta.location.filename())
            .filter_map(Instant::parse);
        Ok(Timeline::new(instants))
    }

    /// File groups retired by completed replace commits (clustering,
    /// insert-overwrite).
    async fn replaced_file_groups(
        &self,
        timeline: &Timeline,
    ) -> Result<HashSet<FileGroupId>, ShelfError> {
        let mut replaced = HashSet::new();
        for timestamp in &timeline.replace_commits {
            let location = self
                .metafolder()
                .child(format!("{timestamp}.replacecommit").as_str());
            let text = self
                .read_text(&location)
                .await
                .map_err(|e| self.unreachable(format!("read replace commit {timestamp}: {e}")))?;
            let groups = parse_replaced_file_ids(&text)
                .map_err(|e| self.unreachable(format!("parse replace commit {timestamp}: {e}")))?;
            replaced.extend(groups);
        }
        Ok(replaced)
    }

    async fn base_files(&self) -> Result<Vec<BaseFile>, ShelfError> {
        let objects: Vec<_> = self
            .store
            .list(Some(&self.base))
            .try_collect()
            .await
            .map_err(|e| self.unreachable(format!("list base files: {e}")))?;

        Ok(objects
            .into_iter()
            .filter_map(|meta| BaseFile::from_location(&self.base, meta.location))
            .collect())
    }

    async fn scan(
        &self,
        files: &[BaseFile],
        options: &[(String, String)],
        columns: &[String],
    ) -> Result<DataFrame, ShelfError> {
        if files.is_empty() {
            warn!("{} has no committed base files", self.uri);
            return empty_frame(columns);
        }

        let cloud_options = match self.url.scheme() {
            "file" => None,
            _ => Some(
                CloudOptions::from_untyped_config(&self.uri, options.iter().cloned())
                    .map_err(|e| self.unreachable(format!("storage options: {e}")))?,
            ),
        };
        let args = ScanArgsParquet {
            cloud_options,
            hive_options: HiveOptions::new_disabled(),
            ..Default::default()
        };
        let paths: Arc<[PlPath]> = files
            .iter()
            .map(|f| PlPath::new(&self.object_uri(&f.location)))
            .collect();

        let uri = self.uri.clone();
        let columns = columns.to_vec();
        tokio::task::spawn_blocking(move || {
            let unreachable = |e: PolarsError| ShelfError::DataSourceUnreachable {
                uri: uri.clone(),
                reason: format!("scan base files: {e}"),
            };

            let mut lf = LazyFrame::scan_parquet_files(paths.into(), args).map_err(unreachable)?;
            let schema = lf.collect_schema().map_err(unreachable)?;
            let missing: Vec<String> = columns
                .iter()
                .filter(|c| !schema.contains(c.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(ShelfError::SchemaMismatch { missing });
            }

            lf.select(columns.iter().map(|c| col(c.as_str())).collect::<Vec<_>>())
                .collect()
                .map_err(unreachable)
        })
        .await?
    }
}

/// A frame of empty text columns, for tables with nothing committed yet.
fn empty_frame(columns: &[String]) -> Result<DataFrame, ShelfError> {
    let empty = columns
        .iter()
        .map(|name| Column::new(name.as_str().into(), Vec::<Option<String>>::new()))
        .collect();
    Ok(DataFrame::new(empty)?)
}

// ── Timeline ────────────────────────────────────────────────────────────────

/// One file of the active timeline, e.g. `20240115103000123.commit` or
/// `20240115103000123.replacecommit.requested`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Instant {
    timestamp: String,
    action: String,
    completed: bool,
}

impl Instant {
    fn parse(file_name: &str) -> Option<Self> {
        let (timestamp, rest) = file_name.split_once('.')?;
        if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let (action, completed) = match rest.split_once('.') {
            Some((action, "requested" | "inflight")) => (action, false),
            Some(_) => return None,
            // A pending commit is written as `<ts>.inflight`.
            None if rest == "inflight" => ("commit", false),
            None => (rest, true),
        };

        Some(Self {
            timestamp: timestamp.to_string(),
            action: action.to_string(),
            completed,
        })
    }

    fn writes_base_files(&self) -> bool {
        matches!(self.action.as_str(), "commit" | "deltacommit" | "replacecommit")
    }
}

#[derive(Debug, Default)]
struct Timeline {
    /// Completed instants that may have written base files.
    completed: HashSet<String>,
    replace_commits: Vec<String>,
    /// Earliest instant still on the active timeline; anything older has
    /// been archived and was committed.
    start: Option<u64>,
}

impl Timeline {
    fn new(instants: impl IntoIterator<Item = Instant>) -> Self {
        let mut timeline = Self::default();
        for instant in instants {
            if let Some(key) = instant_key(&instant.timestamp) {
                timeline.start = Some(timeline.start.map_or(key, |s| s.min(key)));
            }
            if instant.completed && instant.writes_base_files() {
                if instant.action == "replacecommit" {
                    timeline.replace_commits.push(instant.timestamp.clone());
                }
                timeline.completed.insert(instant.timestamp);
            }
        }
        timeline.replace_commits.sort();
        timeline
    }

    fn is_committed(&self, timestamp: &str) -> bool {
        if self.completed.contains(timestamp) {
            return true;
        }
        match (self.start, instant_key(timestamp)) {
            (Some(start), Some(key)) => key < start,
            _ => false,
        }
    }
}

/// Orderable form of an instant time. Older tables use second precision
/// (14 digits), newer ones milliseconds (17 digits).
fn instant_key(timestamp: &str) -> Option<u64> {
    let padded = match timestamp.len() {
        14 => format!("{timestamp}000"),
        17 => timestamp.to_string(),
        _ => return None,
    };
    padded.parse().ok()
}

fn parse_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn parse_replaced_file_ids(text: &str) -> Result<Vec<FileGroupId>, serde_json::Error> {
    let metadata: serde_json::Value = serde_json::from_str(text)?;
    let Some(partitions) = metadata
        .get("partitionToReplaceFileIds")
        .and_then(|v| v.as_object())
    else {
        return Ok(Vec::new());
    };

    Ok(partitions
        .iter()
        .flat_map(|(partition, ids)| {
            ids.as_array()
                .into_iter()
                .flatten()
                .filter_map(|id| id.as_str())
                .map(move |id| FileGroupId {
                    partition: partition.clone(),
                    file_id: id.to_string(),
                })
        })
        .collect())
}

// ── Base files ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct FileGroupId {
    /// Partition path relative to the table root; empty when unpartitioned.
    partition: String,
    file_id: String,
}

/// `<partition>/<fileId>_<writeToken>_<instant>.parquet`
#[derive(Debug, Clone, PartialEq, Eq)]
struct BaseFile {
    group: FileGroupId,
    instant: String,
    location: Path,
}

impl BaseFile {
    fn from_location(base: &Path, location: Path) -> Option<Self> {
        let relative: Vec<String> = location
            .prefix_match(base)?
            .map(|part| part.as_ref().to_string())
            .collect();
        let (file_name, dirs) = relative.split_last()?;
        if dirs.first().map(String::as_str) == Some(METAFOLDER) {
            return None;
        }

        let stem = file_name.strip_suffix(BASE_FILE_SUFFIX)?;
        let mut fields = stem.rsplitn(3, '_');
        let instant = fields.next()?;
        let _write_token = fields.next()?;
        let file_id = fields.next()?;
        if file_id.is_empty() || instant_key(instant).is_none() {
            return None;
        }

        Some(Self {
            group: FileGroupId {
                partition: dirs.join("/"),
                file_id: file_id.to_string(),
            },
            instant: instant.to_string(),
            location,
        })
    }
}

/// The newest committed base file of every live file group, ordered by
/// partition and file id.
fn latest_base_files(
    files: Vec<BaseFile>,
    timeline: &Timeline,
    replaced: &HashSet<FileGroupId>,
) -> Vec<BaseFile> {
    let mut latest: BTreeMap<FileGroupId, BaseFile> = BTreeMap::new();
    for file in files {
        if replaced.contains(&file.group) || !timeline.is_committed(&file.instant) {
            continue;
        }
        match latest.get(&file.group) {
            Some(current) if instant_key(&current.instant) >= instant_key(&file.instant) => {}
            _ => {
                latest.insert(file.group.clone(), file);
            }
        }
    }
    latest.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::schema::product;

    const PROPERTIES: &str = "#Properties saved on 2024-01-01\n\
        hoodie.table.name=prices\n\
        hoodie.table.type=COPY_ON_WRITE\n\
        hoodie.table.version=6\n";

    fn request(uri: &str) -> ReadRequest {
        ReadRequest {
            uri: uri.to_string(),
            region: "us-west-2".into(),
            credentials: AwsCredentials::new("id", "secret", None),
            columns: vec![
                product::NAMES.to_string(),
                product::PRICES.to_string(),
                product::CATEGORY.to_string(),
            ],
        }
    }

    struct TableDir {
        dir: tempfile::TempDir,
    }

    impl TableDir {
        fn new(properties: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join(METAFOLDER)).unwrap();
            fs::write(dir.path().join(METAFOLDER).join(PROPERTIES_FILE), properties).unwrap();
            Self { dir }
        }

        fn uri(&self) -> String {
            self.dir.path().to_string_lossy().into_owned()
        }

        fn instant(&self, name: &str, body: &str) {
            fs::write(self.dir.path().join(METAFOLDER).join(name), body).unwrap();
        }

        fn base_file(&self, partition: &str, name: &str, rows: &[(&str, f64)]) {
            let dir = self.dir.path().join(partition);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(".hoodie_partition_metadata"), "partitionDepth=1\n").unwrap();

            let mut df = df!(
                "_hoodie_commit_time" => vec!["0"; rows.len()],
                product::NAMES => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
                product::PRICES => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
                product::CATEGORY => vec![partition; rows.len()],
            )
            .unwrap();
            let file = fs::File::create(dir.join(name)).unwrap();
            ParquetWriter::new(file).finish(&mut df).unwrap();
        }
    }

    fn names(df: &DataFrame) -> Vec<String> {
        let mut names: Vec<String> = df
            .column(product::NAMES)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_instant_file_names() {
        let done = Instant::parse("20240115103000123.commit").unwrap();
        assert!(done.completed);
        assert_eq!(done.action, "commit");

        let requested = Instant::parse("20240115103000123.replacecommit.requested").unwrap();
        assert!(!requested.completed);
        assert_eq!(requested.action, "replacecommit");

        let inflight = Instant::parse("20240115103000123.inflight").unwrap();
        assert!(!inflight.completed);

        assert!(Instant::parse("hoodie.properties").is_none());
        assert!(Instant::parse("20240115103000123.commit.bak.tmp").is_none());
    }

    #[test]
    fn test_base_file_names() {
        let base = Path::parse("bucket-root/prices").unwrap();
        let location = Path::parse("bucket-root/prices/dairy/fg-1-0_0-12-34_20240115103000123.parquet").unwrap();
        let file = BaseFile::from_location(&base, location).unwrap();
        assert_eq!(file.group.partition, "dairy");
        assert_eq!(file.group.file_id, "fg-1-0");
        assert_eq!(file.instant, "20240115103000123");

        let meta = Path::parse("bucket-root/prices/.hoodie/x_y_20240115103000123.parquet").unwrap();
        assert!(BaseFile::from_location(&base, meta).is_none());
        let other = Path::parse("bucket-root/prices/dairy/.hoodie_partition_metadata").unwrap();
        assert!(BaseFile::from_location(&base, other).is_none());
    }

    #[test]
    fn test_properties_parse() {
        let props = parse_properties(PROPERTIES);
        assert_eq!(props["hoodie.table.type"], "COPY_ON_WRITE");
        assert_eq!(props["hoodie.table.version"], "6");
        assert_eq!(props.len(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_reads_latest_committed_slices() {
        let table = TableDir::new(PROPERTIES);
        table.instant("20240101000000000.commit", "{}");
        table.instant("20240102000000000.commit", "{}");
        table.instant("20240103000000000.commit.requested", "");
        table.instant("20240103000000000.inflight", "");

        table.base_file("dairy", "fg-1-0_0-1-0_20240101000000000.parquet", &[("milk", 1.0)]);
        table.base_file(
            "dairy",
            "fg-1-0_0-2-0_20240102000000000.parquet",
            &[("milk", 1.2), ("cheese", 3.0)],
        );
        table.base_file("bakery", "fg-2-0_0-1-0_20240101000000000.parquet", &[("bread", 1.1)]);
        // Written by the pending commit.
        table.base_file("bakery", "fg-3-0_0-3-0_20240103000000000.parquet", &[("cake", 4.0)]);
        // Committed before the active timeline starts.
        table.base_file("frozen", "fg-5-0_0-0-0_20231201000000000.parquet", &[("peas", 0.9)]);

        let df = HudiTableSource.read(&request(&table.uri())).await.unwrap();

        assert_eq!(df.width(), 3);
        assert_eq!(names(&df), vec!["bread", "cheese", "milk", "peas"]);
        let prices = df.column(product::PRICES).unwrap().f64().unwrap();
        assert!(prices.into_iter().flatten().all(|p| p != 1.0));
    }

    #[tokio::test]
    async fn test_replaced_file_groups_are_skipped() {
        let table = TableDir::new(PROPERTIES);
        table.instant("20240101000000000.commit", "{}");
        table.instant(
            "20240104000000000.replacecommit",
            r#"{"partitionToReplaceFileIds": {"bakery": ["fg-2-0"]}}"#,
        );
        table.base_file("bakery", "fg-2-0_0-1-0_20240101000000000.parquet", &[("bread", 1.1)]);
        table.base_file(
            "bakery",
            "fg-4-0_0-4-0_20240104000000000.parquet",
            &[("bread", 1.1), ("croissant", 0.8)],
        );

        let df = HudiTableSource.read(&request(&table.uri())).await.unwrap();
        assert_eq!(names(&df), vec!["bread", "croissant"]);
    }

    #[tokio::test]
    async fn test_missing_table_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let uri = dir.path().join("nothing-here").to_string_lossy().into_owned();
        match HudiTableSource.read(&request(&uri)).await {
            Err(ShelfError::DataSourceUnreachable { uri: u, reason }) => {
                assert_eq!(u, uri);
                assert!(reason.contains("not a Hudi table"), "{reason}");
            }
            other => panic!("expected unreachable table, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_newer_table_version_is_rejected() {
        let table = TableDir::new("hoodie.table.type=COPY_ON_WRITE\nhoodie.table.version=8\n");
        let err = HudiTableSource.read(&request(&table.uri())).await.unwrap_err();
        assert_eq!(err.kind(), "data_source_unreachable");
        assert!(err.to_string().contains("version 8"));
    }

    #[tokio::test]
    async fn test_missing_column_is_schema_mismatch() {
        let table = TableDir::new(PROPERTIES);
        table.instant("20240101000000000.commit", "{}");
        table.base_file("dairy", "fg-1-0_0-1-0_20240101000000000.parquet", &[("milk", 1.0)]);

        let mut req = request(&table.uri());
        req.columns.push(product::OWN_BRAND.to_string());
        match HudiTableSource.read(&req).await {
            Err(ShelfError::SchemaMismatch { missing }) => assert_eq!(missing, vec!["own_brand"]),
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_table_without_commits_is_empty() {
        let table = TableDir::new(PROPERTIES);
        let df = HudiTableSource.read(&request(&table.uri())).await.unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 3);
    }
}
