pub mod logs;
pub mod songs;
mod source;
pub mod types;
pub mod writer;

pub use logs::LogTableBuilder;
pub use songs::SongTableBuilder;
pub use source::JsonSource;
pub use types::{OutputTable, PipelineReport, SongplayId};
pub use writer::TableWriter;

use datafusion::prelude::{Expr, ident};

/// Plain column references for a table's output columns.
pub(crate) fn columns(table: OutputTable) -> Vec<Expr> {
    table.columns().iter().map(|name| ident(*name)).collect()
}
