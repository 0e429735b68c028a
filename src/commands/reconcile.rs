use anyhow::Result;

use super::{AppContext, follow_progress, load_window};
use crate::output::OutputFormat;
use crate::reconcile::ReconcileOutcome;
use crate::utils::WindowSpec;

pub async fn handle_reconcile_command(ctx: &AppContext, file: &str, spec: &WindowSpec) -> Result<()> {
    let (conversations, window) = load_window(ctx, file, spec)?;
    let engine = ctx.engine().await?;

    let mut handle = engine.reconcile(&conversations, window.context);
    follow_progress(&mut handle, ctx.json).await;
    let report = handle.wait().await;
    engine.cache().persist();

    if ctx.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.to_table(ctx.config.output.decimal_places, ctx.styled));
    }

    if let ReconcileOutcome::ConfigurationError { message } = &report.outcome {
        anyhow::bail!("Conversation service is not usable: {}", message);
    }
    Ok(())
}
