use anyhow::Result;

use super::{AppContext, load_window};
use crate::output::OutputFormat;
use crate::utils::WindowSpec;

pub async fn handle_invalidate_command(ctx: &AppContext, file: &str, spec: &WindowSpec) -> Result<()> {
    let (conversations, _window) = load_window(ctx, file, spec)?;
    let engine = ctx.engine().await?;

    let snapshot = engine.invalidate_and_recompute(&conversations);
    engine.cache().persist();

    if ctx.json {
        println!("{}", snapshot.to_json()?);
    } else {
        println!("{}", snapshot.to_table(ctx.config.output.decimal_places, ctx.styled));
    }
    Ok(())
}
