//! Render command - render one map or a merge

use super::{parse_composite, parse_keys};
use crate::cli::args::RenderArgs;
use crate::cli::output;
use crate::config::Config;
use crate::engine::RenderOptions;
use crate::error::MapmergeResult;
use crate::pipeline::Pipeline;

/// Execute the render command
pub async fn execute(args: RenderArgs, config: &Config) -> MapmergeResult<()> {
    let options = options_from(&args)?;
    let pipeline = Pipeline::from_config(config)?;

    let image = if let [hash] = args.hashes.as_slice() {
        let key = parse_keys(std::slice::from_ref(hash))?.remove(0);
        pipeline.single_render(&key, &options).await?
    } else {
        let keys = parse_composite(&args.hashes)?;
        pipeline.merged_render(&keys, &options).await?
    };

    output::step_ok_detail("Rendered", &image.display().to_string());
    Ok(())
}

fn options_from(args: &RenderArgs) -> MapmergeResult<RenderOptions> {
    Ok(RenderOptions {
        bg_color: RenderOptions::parse_color(&args.bg_color)?,
        draw_alpha: !args.no_draw_alpha,
        draw_origin: args.draw_origin,
        draw_scale: args.draw_scale,
    })
}
