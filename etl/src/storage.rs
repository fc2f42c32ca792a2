use common::config::{Credentials, StorageConfig};
use common::{Error, Result};
use datafusion::datasource::listing::ListingTableUrl;
use datafusion::execution::context::SessionContext;
use datafusion::execution::object_store::ObjectStoreUrl;
use futures::{StreamExt, TryStreamExt};
use glob::{MatchOptions, Pattern};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, trace};
use url::Url;

/// Rewrites Hadoop-style `s3a://` / `s3n://` schemes to `s3://`.
/// Anything without a recognised scheme is treated as a local path.
pub fn normalize_uri(uri: &str) -> String {
    for scheme in ["s3a://", "s3n://"] {
        if let Some(rest) = uri.strip_prefix(scheme) {
            return format!("s3://{}", rest);
        }
    }
    uri.to_string()
}

/// Bucket name of an `s3://` style URI, if it is one.
pub fn s3_bucket(uri: &str) -> Option<String> {
    let url = Url::parse(&normalize_uri(uri)).ok()?;
    if url.scheme() != "s3" {
        return None;
    }
    url.host_str().map(|h| h.to_string())
}

/// Directory URL of a table location, always ending in `/`.
pub fn directory_url(uri: &str) -> Result<ListingTableUrl> {
    let normalized = normalize_uri(uri);
    let with_slash = if normalized.ends_with('/') {
        normalized
    } else {
        format!("{}/", normalized)
    };
    Ok(ListingTableUrl::parse(with_slash)?)
}

/// A path whose trailing segments may contain glob wildcards (`*`, `?`,
/// `[...]`), e.g. `s3://udacity-dend/song_data/*/*/*/*.json`.
///
/// The literal directory before the first wildcard segment is listed once and
/// the remainder is matched as a [`glob::Pattern`]. Wildcards never cross a `/`.
#[derive(Debug, Clone)]
pub struct InputPattern {
    pattern: String,
    root: String,
    glob: Pattern,
    depth: usize,
}

const GLOB_CHARS: [char; 3] = ['*', '?', '['];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn is_glob(segment: &str) -> bool {
    segment.contains(GLOB_CHARS)
}

impl InputPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let normalized = normalize_uri(pattern);

        let (scheme, path) = match normalized.find("://") {
            Some(idx) => normalized.split_at(idx + 3),
            None => ("", normalized.as_str()),
        };

        let parts: Vec<&str> = path.split('/').collect();
        // Without wildcards the last segment is matched literally
        let first_glob = parts
            .iter()
            .position(|p| is_glob(p))
            .unwrap_or(parts.len().saturating_sub(1));

        // The bucket of an object store URL is never a wildcard
        if !scheme.is_empty() && is_glob(parts[0]) {
            return Err(Error::InvalidInput(format!(
                "Wildcard in bucket name is not supported: {}",
                pattern
            )));
        }

        let root = format!("{}{}/", scheme, parts[..first_glob].join("/"));
        let segments: Vec<&str> = parts[first_glob..]
            .iter()
            .copied()
            .filter(|p| !p.is_empty())
            .collect();

        if let Some(bad) = segments.iter().find(|s| s.contains("**")) {
            return Err(Error::InvalidInput(format!(
                "Recursive wildcard '{}' is not supported in {}",
                bad, pattern
            )));
        }

        let glob = Pattern::new(&segments.join("/")).map_err(|e| {
            Error::InvalidInput(format!("Invalid wildcard in {}: {}", pattern, e))
        })?;

        let depth = segments.len();
        Ok(Self {
            pattern: normalized,
            root,
            glob,
            depth,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// The literal directory preceding the first wildcard.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// True when `relative` (path below the root) matches the wildcard segments.
    pub fn matches<S: AsRef<str>>(&self, relative: &[S]) -> bool {
        if relative.len() != self.depth {
            return false;
        }
        let joined = relative
            .iter()
            .map(|part| part.as_ref())
            .collect::<Vec<_>>()
            .join("/");
        self.glob.matches_with(&joined, MATCH_OPTIONS)
    }

    /// Lists the root once through the context's object store and returns the
    /// URLs of every matching object, sorted. No match is an error.
    pub async fn resolve(&self, ctx: &SessionContext) -> Result<Vec<String>> {
        let root_url = ListingTableUrl::parse(&self.root)?;
        let store_url = root_url.object_store();
        let store = ctx.runtime_env().object_store(&store_url)?;
        let prefix = root_url.prefix().clone();

        let mut files = Vec::new();
        let mut listing = store.list(Some(&prefix));
        while let Some(meta) = listing.try_next().await? {
            let Some(parts) = meta.location.prefix_match(&prefix) else {
                continue;
            };
            let relative: Vec<String> = parts.map(|p| p.as_ref().to_string()).collect();

            if self.matches(&relative) {
                files.push(object_url(&store_url, &meta.location));
            }
        }

        if files.is_empty() {
            return Err(Error::NoInputFiles(self.pattern.clone()));
        }

        files.sort();
        debug!(pattern = %self.pattern, count = files.len(), "Resolved input files");
        Ok(files)
    }
}

fn object_url(store_url: &ObjectStoreUrl, location: &ObjectPath) -> String {
    format!("{}{}", store_url.as_str(), location)
}

/// Builds S3 connectors from explicit settings and attaches them to a context.
#[derive(Clone)]
pub struct S3Connector {
    config: StorageConfig,
    credentials: Option<Credentials>,
}

impl S3Connector {
    pub fn new(config: StorageConfig, credentials: Option<Credentials>) -> Self {
        Self {
            config,
            credentials,
        }
    }

    pub fn build_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        // Without a credentials file the builder falls back to its own
        // environment lookup; nothing is written to the environment here.
        let mut builder = match &self.credentials {
            Some(credentials) => AmazonS3Builder::new()
                .with_access_key_id(&credentials.aws_access_key_id)
                .with_secret_access_key(&credentials.aws_secret_access_key),
            None => AmazonS3Builder::from_env(),
        };

        builder = builder
            .with_bucket_name(bucket)
            .with_region(&self.config.region)
            .with_allow_http(self.config.allow_http);

        if let Some(endpoint) = &self.config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        Ok(Arc::new(builder.build()?))
    }

    /// Registers one store per distinct bucket among `uris`. Local paths are
    /// served by the context's default file system store.
    pub fn register_buckets<'a, I>(&self, ctx: &SessionContext, uris: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let buckets: BTreeSet<String> = uris.into_iter().filter_map(s3_bucket).collect();

        for bucket in &buckets {
            let store = self.build_store(bucket)?;
            let url = Url::parse(&format!("s3://{}", bucket))?;
            ctx.runtime_env().register_object_store(&url, store);
            info!(bucket = %bucket, region = %self.config.region, "Registered S3 object store");
        }

        Ok(buckets.into_iter().collect())
    }
}

/// Deletes every object below `dir` so the next write fully replaces it.
/// Returns the number of objects removed.
pub async fn clear_prefix(ctx: &SessionContext, dir: &ListingTableUrl) -> Result<usize> {
    let store_url = dir.object_store();
    let store = ctx.runtime_env().object_store(&store_url)?;
    let prefix = dir.prefix().clone();

    let locations = store
        .list(Some(&prefix))
        .map_ok(|meta| meta.location)
        .boxed();

    let deleted: Vec<ObjectPath> = store.delete_stream(locations).try_collect().await?;
    if !deleted.is_empty() {
        debug!(prefix = %prefix, count = deleted.len(), "Cleared previous output");
    }

    // Object stores have no directories, the local file system keeps them
    if dir.scheme() == "file" {
        if let Ok(base) = Url::parse(dir.as_str())?.to_file_path() {
            for location in &deleted {
                if let Ok(file) = Url::parse(&object_url(&store_url, location))?.to_file_path() {
                    remove_empty_parents(&base, &file).await;
                }
            }
        }
    }

    Ok(deleted.len())
}

/// Removes empty directories from `file` upwards, stopping at `base`.
async fn remove_empty_parents(base: &Path, file: &Path) {
    let mut current = file.parent();

    while let Some(dir) = current {
        if dir == base || !dir.starts_with(base) {
            break;
        }

        // Fails while the directory still has entries
        match tokio::fs::remove_dir(dir).await {
            Ok(()) => {
                trace!(path = %dir.display(), "Removed empty directory");
                current = dir.parent();
            }
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_uri() {
        assert_eq!(normalize_uri("s3a://udacity-dend/"), "s3://udacity-dend/");
        assert_eq!(normalize_uri("s3n://bucket/key"), "s3://bucket/key");
        assert_eq!(normalize_uri("s3://bucket/key"), "s3://bucket/key");
        assert_eq!(normalize_uri("/tmp/data"), "/tmp/data");
    }

    #[test]
    fn test_s3_bucket() {
        assert_eq!(s3_bucket("s3a://udacity-dend/song_data"), Some("udacity-dend".to_string()));
        assert_eq!(s3_bucket("/local/path"), None);
        assert_eq!(s3_bucket("file:///local/path"), None);
    }

    #[test]
    fn test_pattern_split() {
        let pattern = InputPattern::parse("s3a://udacity-dend/song_data/*/*/*/*.json").unwrap();
        assert_eq!(pattern.root(), "s3://udacity-dend/song_data/");
        assert_eq!(pattern.as_str(), "s3://udacity-dend/song_data/*/*/*/*.json");

        assert!(pattern.matches(&["A", "B", "C", "TRAAAAW128F429D538.json"]));
        assert!(!pattern.matches(&["A", "B", "TRAAAAW128F429D538.json"]));
        assert!(!pattern.matches(&["A", "B", "C", "D", "x.json"]));
        assert!(!pattern.matches(&["A", "B", "C", "notes.txt"]));
    }

    #[test]
    fn test_local_pattern_split() {
        let pattern = InputPattern::parse("/data/log_data/*/*/*.json").unwrap();
        assert_eq!(pattern.root(), "/data/log_data/");
        assert!(pattern.matches(&["2018", "11", "2018-11-01-events.json"]));
    }

    #[test]
    fn test_pattern_without_wildcard() {
        let pattern = InputPattern::parse("/data/log_data/2018/11/2018-11-01-events.json").unwrap();
        assert_eq!(pattern.root(), "/data/log_data/2018/11/");
        assert!(pattern.matches(&["2018-11-01-events.json"]));
        assert!(!pattern.matches(&["2018-11-02-events.json"]));
    }

    #[test]
    fn test_pattern_rejects_bucket_wildcard() {
        assert!(InputPattern::parse("s3://*/song_data").is_err());
        assert!(InputPattern::parse("s3://bucket/**/x.json").is_err());
    }

    #[test]
    fn test_pattern_character_wildcards() {
        let pattern = InputPattern::parse("/data/song_data/?/[AB]/*.json").unwrap();
        assert_eq!(pattern.root(), "/data/song_data/");
        assert!(pattern.matches(&["A", "B", "TRX.json"]));
        assert!(!pattern.matches(&["AA", "B", "TRX.json"]));
        assert!(!pattern.matches(&["A", "C", "TRX.json"]));

        let pattern = InputPattern::parse("/data/log_data/2018/1?/*.json").unwrap();
        assert_eq!(pattern.root(), "/data/log_data/2018/");
        assert!(pattern.matches(&["11", "2018-11-01-events.json"]));
        assert!(!pattern.matches(&["09", "2018-09-01-events.json"]));
    }

    #[test]
    fn test_wildcard_stays_in_segment() {
        let pattern = InputPattern::parse("/data/song_data/*.json").unwrap();
        assert!(pattern.matches(&["a.json"]));
        assert!(!pattern.matches(&["a", "b.json"]));
        assert!(!pattern.matches(&["a.json.bak"]));

        let pattern = InputPattern::parse("/data/log_data/2018-*-events.json").unwrap();
        assert!(pattern.matches(&["2018-11-01-events.json"]));
        assert!(!pattern.matches(&["2019-11-01-events.json"]));
    }

    #[test]
    fn test_pattern_rejects_malformed_class() {
        let result = InputPattern::parse("/data/song_data/[A/*.json");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_directory_url_appends_slash() {
        let url = directory_url("s3a://output-data-spark/songs").unwrap();
        assert_eq!(url.as_str(), "s3://output-data-spark/songs/");
    }

    #[test]
    fn test_register_buckets_dedups() {
        let ctx = SessionContext::new();
        let connector = S3Connector::new(
            StorageConfig {
                region: "us-west-2".to_string(),
                endpoint: Some("http://localhost:9000".to_string()),
                allow_http: true,
            },
            Some(Credentials {
                aws_access_key_id: "key".to_string(),
                aws_secret_access_key: "secret".to_string(),
            }),
        );

        let buckets = connector
            .register_buckets(
                &ctx,
                [
                    "s3a://udacity-dend/song_data/*/*/*/*.json",
                    "s3://udacity-dend/log_data/*/*/*.json",
                    "s3a://output-data-spark/",
                    "/tmp/local",
                ],
            )
            .unwrap();

        assert_eq!(buckets, vec!["output-data-spark", "udacity-dend"]);
        let url = ObjectStoreUrl::parse("s3://udacity-dend").unwrap();
        assert!(ctx.runtime_env().object_store(&url).is_ok());
    }

    #[tokio::test]
    async fn test_resolve_and_clear_local() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("log_data");
        std::fs::create_dir_all(root.join("2018/11")).unwrap();
        std::fs::write(root.join("2018/11/2018-11-01-events.json"), "{}\n").unwrap();
        std::fs::write(root.join("2018/11/2018-11-02-events.json"), "{}\n").unwrap();
        std::fs::write(root.join("2018/11/README.md"), "skip").unwrap();
        std::fs::write(root.join("2018/top-level.json"), "{}\n").unwrap();

        let ctx = SessionContext::new();
        let pattern =
            InputPattern::parse(&format!("{}/*/*/*.json", root.to_str().unwrap())).unwrap();
        let files = pattern.resolve(&ctx).await.unwrap();

        assert_eq!(files.len(), 2);
        assert!(files[0].starts_with("file:///"));
        assert!(files[0].ends_with("2018-11-01-events.json"));
        assert!(files[1].ends_with("2018-11-02-events.json"));

        let removed = clear_prefix(&ctx, &directory_url(root.to_str().unwrap()).unwrap())
            .await
            .unwrap();
        assert_eq!(removed, 4);
        assert!(root.is_dir());
        assert!(!root.join("2018").exists());

        let empty = InputPattern::parse(&format!("{}/*/*/*.json", root.to_str().unwrap()))
            .unwrap()
            .resolve(&ctx)
            .await;
        assert!(matches!(empty, Err(Error::NoInputFiles(_))));
    }
}
