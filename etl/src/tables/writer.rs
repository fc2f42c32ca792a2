use super::types::OutputTable;
use crate::storage::{clear_prefix, directory_url};
use arrow::array::AsArray;
use arrow::datatypes::{DataType, UInt64Type};
use arrow::record_batch::RecordBatch;
use common::Result;
use datafusion::common::config::TableParquetOptions;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::datasource::listing::ListingTableUrl;
use datafusion::functions::expr_fn::coalesce;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

pub const CREATED_BY: &str = concat!("sparkify-etl ", env!("CARGO_PKG_VERSION"));

/// Directory value for a null partition key, as Hive and Spark write it.
pub const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Writes output tables as Parquet under a common root, replacing whatever a
/// previous run left at each table's location.
pub struct TableWriter {
    ctx: Arc<SessionContext>,
    output_root: String,
}

impl TableWriter {
    pub fn new(ctx: Arc<SessionContext>, output_root: &str) -> Self {
        Self {
            ctx,
            output_root: output_root.to_string(),
        }
    }

    pub fn table_url(&self, table: OutputTable) -> Result<ListingTableUrl> {
        directory_url(&format!(
            "{}/{}",
            self.output_root.trim_end_matches('/'),
            table.subpath()
        ))
    }

    /// Projects `df` onto the table's columns and writes it with full
    /// overwrite semantics. Returns the number of rows written.
    pub async fn overwrite(&self, df: DataFrame, table: OutputTable) -> Result<usize> {
        let target = self.table_url(table)?;
        let partition_by = table.partition_columns();

        // Partition values become directory names; nulls get the Hive sentinel
        let select_exprs: Vec<Expr> = table
            .columns()
            .iter()
            .map(|name| {
                if partition_by.contains(name) {
                    coalesce(vec![cast(ident(*name), DataType::Utf8), lit(NULL_PARTITION)])
                        .alias(*name)
                } else {
                    ident(*name)
                }
            })
            .collect();
        let df = df.select(select_exprs)?;

        let removed = clear_prefix(&self.ctx, &target).await?;
        info!(
            table = %table,
            target = %target,
            removed,
            partition_by = ?partition_by,
            "Writing table"
        );

        let write_options = DataFrameWriteOptions::new().with_partition_by(
            partition_by.iter().map(|c| c.to_string()).collect(),
        );

        let result = df
            .write_parquet(target.as_str(), write_options, Some(parquet_options(table)))
            .await?;

        let rows = rows_written(&result);
        info!(table = %table, rows, "Table written");
        Ok(rows)
    }
}

fn parquet_options(table: OutputTable) -> TableParquetOptions {
    let mut options = TableParquetOptions::new();
    options.global.compression = Some("snappy".to_string());
    options.global.created_by = CREATED_BY.to_string();
    options
        .key_value_metadata
        .insert("sparkify_table".to_string(), Some(table.as_str().to_string()));
    options
}

// write_parquet reports a single `count` column
fn rows_written(batches: &[RecordBatch]) -> usize {
    batches
        .iter()
        .filter_map(|batch| batch.column_by_name("count"))
        .filter_map(|column| column.as_primitive_opt::<UInt64Type>())
        .flat_map(|counts| counts.iter().flatten())
        .sum::<u64>() as usize
}
