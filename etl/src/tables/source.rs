use crate::schema::{InputDataset, get_input_schema};
use crate::storage::InputPattern;
use common::Result;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Reads JSON Lines records matching a wildcard pattern with an explicit schema.
pub struct JsonSource {
    ctx: Arc<SessionContext>,
}

impl JsonSource {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    pub async fn load(&self, dataset: InputDataset, pattern: &str) -> Result<DataFrame> {
        let pattern = InputPattern::parse(pattern)?;
        let files = pattern.resolve(&self.ctx).await?;
        info!(
            dataset = dataset.as_str(),
            pattern = pattern.as_str(),
            files = files.len(),
            "Loading source data"
        );

        let schema = get_input_schema(dataset);
        let options = NdJsonReadOptions::default()
            .schema(schema.as_ref())
            .file_extension(file_extension(&files));

        let df = self.ctx.read_json(files, options).await?;
        Ok(df.alias(dataset.as_str())?)
    }
}

// All resolved files share the pattern's final segment; use its extension
// so the listing does not drop them.
fn file_extension(files: &[String]) -> &'static str {
    if files.iter().all(|f| f.ends_with(".json")) {
        ".json"
    } else {
        ""
    }
}
