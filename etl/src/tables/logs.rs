use super::columns;
use super::source::JsonSource;
use super::types::{OutputTable, PipelineReport, SongplayId};
use super::writer::TableWriter;
use crate::schema::InputDataset;
use crate::udf::{local_datetime, parse_timezone};
use arrow::datatypes::DataType;
use common::Result;
use datafusion::common::JoinType;
use datafusion::functions::expr_fn::date_part;
use datafusion::functions_window::expr_fn::row_number;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Only song plays feed the user, time and songplay tables.
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// Derives `users`, `time` and `songplays` from the event log.
pub struct LogTableBuilder {
    ctx: Arc<SessionContext>,
    source: JsonSource,
    writer: TableWriter,
    timezone: String,
}

impl LogTableBuilder {
    pub fn new(ctx: Arc<SessionContext>, output_root: &str, timezone: &str) -> Self {
        Self {
            source: JsonSource::new(ctx.clone()),
            writer: TableWriter::new(ctx.clone(), output_root),
            ctx,
            timezone: timezone.to_string(),
        }
    }

    pub async fn process(&self, log_data: &str, song_data: &str) -> Result<PipelineReport> {
        // Fail before touching any data if the zone is bogus
        parse_timezone(&self.timezone)?;

        let mut report = PipelineReport::default();
        let logs = self.source.load(InputDataset::Logs, log_data).await?;
        let plays = next_song_events(logs)?;

        info!("Logs: extracting users table");
        let users = users_table(plays.clone())?;
        let rows = self.writer.overwrite(users, OutputTable::Users).await?;
        report.record(OutputTable::Users, rows);

        info!(timezone = %self.timezone, "Logs: extracting time table");
        let plays = with_time_parts(&self.ctx, plays, &self.timezone)?;
        let time = time_table(plays.clone())?;
        let rows = self.writer.overwrite(time, OutputTable::Time).await?;
        report.record(OutputTable::Time, rows);

        info!("Logs: joining song data for songplays table");
        let songs = self.source.load(InputDataset::Songs, song_data).await?;
        let songplays = songplays_table(plays, songs)?;
        let rows = self.writer.overwrite(songplays, OutputTable::Songplays).await?;
        report.record(OutputTable::Songplays, rows);

        Ok(report)
    }
}

pub fn next_song_events(logs: DataFrame) -> Result<DataFrame> {
    Ok(logs.filter(ident("page").eq(lit(NEXT_SONG_PAGE)))?)
}

/// One row per userId, ascending.
pub fn users_table(plays: DataFrame) -> Result<DataFrame> {
    Ok(plays
        .distinct_on(vec![ident("userId")], columns(OutputTable::Users), None)?
        .sort(vec![ident("userId").sort(true, false)])?)
}

fn time_part(part: &str) -> Expr {
    cast(date_part(lit(part), ident("datetime")), DataType::Int32)
}

/// Adds `datetime` (wall-clock time of `ts` in `timezone`) and its calendar
/// decomposition. `weekday` runs from 1 (Sunday) to 7 (Saturday).
pub fn with_time_parts(ctx: &SessionContext, plays: DataFrame, timezone: &str) -> Result<DataFrame> {
    let datetime = local_datetime(ctx, ident("ts"), timezone)?;

    Ok(plays
        .with_column("datetime", datetime)?
        .with_column("hour", time_part("hour"))?
        .with_column("day", time_part("day"))?
        .with_column("week", time_part("week"))?
        .with_column("month", time_part("month"))?
        .with_column("year", time_part("year"))?
        .with_column("weekday", time_part("dow") + lit(1_i32))?)
}

pub fn time_table(plays: DataFrame) -> Result<DataFrame> {
    Ok(plays.select(columns(OutputTable::Time))?.distinct()?)
}

/// Inner join on `song == title`. Plays without a matching title are dropped.
pub fn songplays_table(plays: DataFrame, songs: DataFrame) -> Result<DataFrame> {
    let plays = plays.select(vec![
        ident("ts"),
        ident("userId"),
        ident("level"),
        ident("sessionId"),
        ident("location"),
        ident("userAgent"),
        ident("song"),
        ident("year"),
        ident("month"),
    ])?;
    let songs = songs.select(vec![ident("title"), ident("song_id"), ident("artist_id")])?;

    let joined = plays.join(songs, JoinType::Inner, &["song"], &["title"], None)?;

    let select_exprs: Vec<Expr> = OutputTable::Songplays
        .columns()
        .iter()
        .map(|name| {
            if *name == SongplayId::COLUMN {
                cast(row_number(), DataType::Int64).alias(SongplayId::COLUMN)
            } else {
                ident(*name)
            }
        })
        .collect();

    Ok(joined.select(select_exprs)?)
}
