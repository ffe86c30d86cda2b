//! Merge command - produce a merged map store locally

use super::parse_composite;
use crate::cli::args::MergeArgs;
use crate::cli::output;
use crate::config::Config;
use crate::error::MapmergeResult;
use crate::pipeline::Pipeline;

/// Execute the merge command
pub async fn execute(args: MergeArgs, config: &Config) -> MapmergeResult<()> {
    let keys = parse_composite(&args.hashes)?;
    let pipeline = Pipeline::from_config(config)?;

    let info = pipeline.merged_info(&keys).await?;
    let path = pipeline.layout().merged_store(&keys);

    output::step_ok_detail("Merged", &path.display().to_string());
    output::kv("size", &format!("{} bytes", info.size));
    output::kv("expires", &format!("in {}s", info.lifetime / 1000));
    Ok(())
}
