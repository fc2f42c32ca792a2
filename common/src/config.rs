use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Default source bucket holding `song_data/` and `log_data/`.
pub const DEFAULT_INPUT_ROOT: &str = "s3a://udacity-dend/";
/// Default destination bucket for the five output tables.
pub const DEFAULT_OUTPUT_ROOT: &str = "s3a://output-data-spark/";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_input_root")]
    pub input_root: String,
    #[serde(default = "default_output_root")]
    pub output_root: String,
    #[serde(default = "default_song_data")]
    pub song_data: String,
    #[serde(default = "default_log_data")]
    pub log_data: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
    #[serde(default = "default_storage_config")]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint (MinIO, localstack). `None` talks to AWS.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
}

fn default_input_root() -> String {
    DEFAULT_INPUT_ROOT.to_string()
}

fn default_output_root() -> String {
    DEFAULT_OUTPUT_ROOT.to_string()
}

fn default_song_data() -> String {
    "song_data/*/*/*/*.json".to_string()
}

fn default_log_data() -> String {
    "log_data/*/*/*.json".to_string()
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_credentials_path() -> String {
    "dl.cfg".to_string()
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_storage_config() -> StorageConfig {
    StorageConfig {
        region: default_region(),
        endpoint: None,
        allow_http: false,
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_root: default_input_root(),
            output_root: default_output_root(),
            song_data: default_song_data(),
            log_data: default_log_data(),
            timezone: default_timezone(),
            credentials_path: default_credentials_path(),
            storage: default_storage_config(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional TOML file layered under `APP__*`
    /// environment variables. A missing file leaves every key at its default.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"));

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        debug!(
            input_root = %settings.input_root,
            output_root = %settings.output_root,
            timezone = %settings.timezone,
            "Loaded ETL settings"
        );

        Ok(settings)
    }

    /// Song record pattern joined onto the input root.
    pub fn song_data_path(&self) -> String {
        join_root(&self.input_root, &self.song_data)
    }

    /// Log record pattern joined onto the input root.
    pub fn log_data_path(&self) -> String {
        join_root(&self.input_root, &self.log_data)
    }
}

fn join_root(root: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// Object-store access keys read from the INI credentials file.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(alias = "AWS_ACCESS_KEY_ID")]
    pub aws_access_key_id: String,
    #[serde(alias = "AWS_SECRET_ACCESS_KEY")]
    pub aws_secret_access_key: String,
}

#[derive(Deserialize)]
struct CredentialsFile {
    #[serde(alias = "AWS")]
    aws: Credentials,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Reads the `[AWS]` section of an INI file. Returns `Ok(None)` when the
    /// file does not exist so local-only runs need no credentials.
    pub fn load(path: &str) -> Result<Option<Self>, ConfigError> {
        if !Path::new(path).exists() {
            debug!(path, "No credentials file found");
            return Ok(None);
        }

        let config = Config::builder()
            .add_source(File::new(path, FileFormat::Ini))
            .build()?;
        let file: CredentialsFile = config.try_deserialize()?;

        debug!(path, key_id = %file.aws.aws_access_key_id, "Loaded storage credentials");
        Ok(Some(file.aws))
    }
}
