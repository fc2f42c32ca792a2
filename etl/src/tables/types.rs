use arrow::array::{Array, AsArray};
use arrow::datatypes::Int64Type;
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use std::fmt;

// All tables written by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputTable {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

impl OutputTable {
    pub const ALL: [OutputTable; 5] = [
        Self::Songs,
        Self::Artists,
        Self::Users,
        Self::Time,
        Self::Songplays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Songs => "songs",
            Self::Artists => "artists",
            Self::Users => "users",
            Self::Time => "time",
            Self::Songplays => "songplays",
        }
    }

    /// Columns in output order, partition columns included.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Songs => &["song_id", "title", "artist_id", "year", "duration"],
            Self::Artists => &[
                "artist_id",
                "artist_name",
                "artist_location",
                "artist_latitude",
                "artist_longitude",
            ],
            Self::Users => &["userId", "firstName", "lastName", "gender", "level"],
            Self::Time => &["datetime", "hour", "day", "week", "month", "year", "weekday"],
            Self::Songplays => &[
                "songplay_id",
                "ts",
                "userId",
                "level",
                "song_id",
                "artist_id",
                "sessionId",
                "location",
                "userAgent",
                "year",
                "month",
            ],
        }
    }

    /// Hive-style directory partitioning applied on write.
    pub fn partition_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Songs => &["year", "artist_id"],
            Self::Time | Self::Songplays => &["year", "month"],
            Self::Artists | Self::Users => &[],
        }
    }

    /// Destination directory under the output root, with trailing slash.
    pub fn subpath(&self) -> String {
        format!("{}/", self.as_str())
    }
}

impl fmt::Display for OutputTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthetic key of a songplay row.
///
/// Unique within one run and nothing more: values are neither ordered, dense,
/// nor stable across runs, so the type only supports equality and hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SongplayId(i64);

impl SongplayId {
    pub const COLUMN: &'static str = "songplay_id";

    pub(crate) fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Reads the `songplay_id` column out of songplays batches.
    pub fn from_batches(batches: &[RecordBatch]) -> Result<Vec<SongplayId>> {
        let mut ids = Vec::new();
        for batch in batches {
            let column = batch.column_by_name(Self::COLUMN).ok_or_else(|| {
                Error::InvalidInput(format!("Batch has no {} column", Self::COLUMN))
            })?;
            let values = column.as_primitive_opt::<Int64Type>().ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Expected Int64 {} column, found {:?}",
                    Self::COLUMN,
                    column.data_type()
                ))
            })?;
            ids.extend(values.iter().flatten().map(Self::from_raw));
        }
        Ok(ids)
    }
}

/// Rows written per table, in the order the tables were written.
#[derive(Debug, Default, Clone)]
pub struct PipelineReport {
    pub tables: Vec<(OutputTable, usize)>,
}

impl PipelineReport {
    pub fn record(&mut self, table: OutputTable, rows: usize) {
        self.tables.push((table, rows));
    }

    pub fn rows_written(&self, table: OutputTable) -> Option<usize> {
        self.tables
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, rows)| *rows)
    }

    pub fn merge(&mut self, other: PipelineReport) {
        self.tables.extend(other.tables);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_columns_are_output_columns() {
        for table in OutputTable::ALL {
            for partition in table.partition_columns() {
                assert!(
                    table.columns().contains(partition),
                    "{} partitions on unknown column {}",
                    table,
                    partition
                );
            }
        }
    }

    #[test]
    fn test_subpaths() {
        let paths: Vec<String> = OutputTable::ALL.iter().map(|t| t.subpath()).collect();
        assert_eq!(
            paths,
            vec!["songs/", "artists/", "users/", "time/", "songplays/"]
        );
    }

    #[test]
    fn test_report_lookup() {
        let mut report = PipelineReport::default();
        report.record(OutputTable::Songs, 3);
        let mut other = PipelineReport::default();
        other.record(OutputTable::Users, 2);
        report.merge(other);

        assert_eq!(report.rows_written(OutputTable::Songs), Some(3));
        assert_eq!(report.rows_written(OutputTable::Users), Some(2));
        assert_eq!(report.rows_written(OutputTable::Time), None);
    }
}
