use anyhow::Result;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{AppContext, load_window, report_progress};
use crate::engine::AggregationSnapshot;
use crate::output::OutputFormat;
use crate::reconcile::ReconcileOutcome;
use crate::utils::WindowSpec;

pub async fn handle_snapshot_command(
    ctx: &AppContext,
    file: &str,
    spec: &WindowSpec,
    no_reconcile: bool,
    live: bool,
) -> Result<()> {
    let (conversations, window) = load_window(ctx, file, spec)?;
    let engine = ctx.engine().await?;

    let mut escalated = None;
    if !no_reconcile && !conversations.is_empty() {
        let stop_watching = CancellationToken::new();
        let mut updates = live.then(|| engine.watch(conversations.clone(), stop_watching.clone()));
        let mut handle = engine.reconcile(&conversations, window.context);

        loop {
            tokio::select! {
                progress = handle.next_progress() => match progress {
                    Some(progress) => report_progress(&progress, ctx.json),
                    None => break,
                },
                Some(snapshot) = next_update(&mut updates) => {
                    print_snapshot(ctx, &snapshot)?;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received; cancelling reconciliation");
                    handle.cancel();
                }
            }
        }
        stop_watching.cancel();

        let report = handle.wait().await;
        match report.outcome {
            ReconcileOutcome::ConfigurationError { message } => escalated = Some(message),
            ReconcileOutcome::Aborted { diagnostic } => {
                if !ctx.json {
                    eprintln!("Warning: reconciliation skipped: {}", diagnostic);
                }
            }
            ReconcileOutcome::Completed | ReconcileOutcome::Cancelled => {}
        }
    }

    let snapshot = engine.snapshot(&conversations);
    engine.cache().persist();
    print_snapshot(ctx, &snapshot)?;

    if let Some(message) = escalated {
        anyhow::bail!("Conversation service is not usable: {}", message);
    }
    Ok(())
}

/// Next live snapshot, or never when not watching
async fn next_update(
    updates: &mut Option<watch::Receiver<AggregationSnapshot>>,
) -> Option<AggregationSnapshot> {
    if let Some(rx) = updates {
        if rx.changed().await.is_ok() {
            return Some(rx.borrow_and_update().clone());
        }
    }
    std::future::pending().await
}

fn print_snapshot(ctx: &AppContext, snapshot: &AggregationSnapshot) -> Result<()> {
    if ctx.json {
        println!("{}", snapshot.to_json()?);
    } else {
        println!("{}", snapshot.to_table(ctx.config.output.decimal_places, ctx.styled));
    }
    Ok(())
}
