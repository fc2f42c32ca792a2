use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use once_cell::sync::Lazy;
use std::sync::Arc;

// Raw source schemas. Fields present in the files but missing here are ignored
// by the JSON reader; a value that does not fit its declared type fails the read.
pub fn song_data_schema() -> Schema {
    Schema::new(vec![
        Field::new("num_songs", DataType::Int64, true),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_name", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("duration", DataType::Float64, true),
        Field::new("year", DataType::Int64, true),
    ])
}

pub fn log_data_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist", DataType::Utf8, true),
        Field::new("auth", DataType::Utf8, true),
        Field::new("firstName", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("itemInSession", DataType::Int64, true),
        Field::new("lastName", DataType::Utf8, true),
        Field::new("length", DataType::Float64, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("method", DataType::Utf8, true),
        Field::new("page", DataType::Utf8, true),
        Field::new("registration", DataType::Float64, true),
        Field::new("sessionId", DataType::Int64, true),
        Field::new("song", DataType::Utf8, true),
        Field::new("status", DataType::Int64, true),
        Field::new("ts", DataType::Int64, false),
        Field::new("userAgent", DataType::Utf8, true),
        Field::new("userId", DataType::Utf8, true),
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDataset {
    Songs,
    Logs,
}

impl InputDataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Songs => "song_data",
            Self::Logs => "log_data",
        }
    }
}

pub fn get_input_schema(dataset: InputDataset) -> SchemaRef {
    match dataset {
        InputDataset::Songs => SONG_DATA_SCHEMA.clone(),
        InputDataset::Logs => LOG_DATA_SCHEMA.clone(),
    }
}

// Lazy-loaded static schemas
static SONG_DATA_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| Arc::new(song_data_schema()));
static LOG_DATA_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| Arc::new(log_data_schema()));
