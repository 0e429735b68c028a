use anyhow::Result;

use super::AppContext;
use crate::cli::CacheAction;
use crate::models::CurrencyConverter;
use crate::output::OutputFormat;

pub fn handle_cache_action(ctx: &AppContext, action: CacheAction) -> Result<()> {
    let db = ctx.database()?;
    let cache = ctx.open_cache(&db)?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            if ctx.json {
                println!("{}", stats.to_json()?);
            } else {
                println!(
                    "Segment cache ({} backend, scope '{}', TTL {}h)",
                    ctx.config.cache.backend, ctx.config.cache.scope, ctx.config.cache.ttl_hours
                );
                println!("{}", stats.to_table(ctx.config.output.decimal_places, ctx.styled));
            }
        }
        CacheAction::Clear => {
            let before = cache.stats();
            cache.clear();
            let removed = before.quick + before.authoritative;
            let stale_rates = CurrencyConverter::new(db, ctx.config.currency.cache_ttl_hours)?.cleanup_cache()?;
            if ctx.json {
                println!(
                    r#"{{"status": "success", "removed": {}, "stale_rates_removed": {}}}"#,
                    removed, stale_rates
                );
            } else {
                println!("Cleared {} cached segment counts", removed);
                if stale_rates > 0 {
                    println!("Removed {} stale exchange rates", stale_rates);
                }
            }
        }
    }
    Ok(())
}
