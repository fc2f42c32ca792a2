use super::columns;
use super::source::JsonSource;
use super::types::{OutputTable, PipelineReport};
use super::writer::TableWriter;
use crate::schema::InputDataset;
use common::Result;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Derives the `songs` and `artists` tables from song records.
pub struct SongTableBuilder {
    source: JsonSource,
    writer: TableWriter,
}

impl SongTableBuilder {
    pub fn new(ctx: Arc<SessionContext>, output_root: &str) -> Self {
        Self {
            source: JsonSource::new(ctx.clone()),
            writer: TableWriter::new(ctx, output_root),
        }
    }

    pub async fn process(&self, song_data: &str) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        let df = self.source.load(InputDataset::Songs, song_data).await?;

        info!("Songs: extracting songs table");
        let songs = songs_table(df.clone())?;
        let rows = self.writer.overwrite(songs, OutputTable::Songs).await?;
        report.record(OutputTable::Songs, rows);

        info!("Songs: extracting artists table");
        let artists = artists_table(df)?;
        let rows = self.writer.overwrite(artists, OutputTable::Artists).await?;
        report.record(OutputTable::Artists, rows);

        Ok(report)
    }
}

pub fn songs_table(df: DataFrame) -> Result<DataFrame> {
    Ok(df.select(columns(OutputTable::Songs))?)
}

/// One row per artist_id; which duplicate survives is unspecified.
pub fn artists_table(df: DataFrame) -> Result<DataFrame> {
    Ok(df.distinct_on(
        vec![ident("artist_id")],
        columns(OutputTable::Artists),
        None,
    )?)
}
