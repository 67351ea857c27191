use clap::Args;
use respiro_core::{Database, Result};

#[derive(Args)]
pub struct StatsArgs {
    /// Include the most recent N sessions
    #[arg(long, default_value = "0")]
    pub recent: usize,
}

pub fn run(args: StatsArgs) -> Result<()> {
    let db = Database::open()?;
    let stats = db.stats_all()?;

    if args.recent == 0 {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let recent = db.recent_sessions(args.recent)?;
    let out = serde_json::json!({ "stats": stats, "recent": recent });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
