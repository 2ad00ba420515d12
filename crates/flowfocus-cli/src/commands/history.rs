use chrono::Local;
use clap::Args;
use flowfocus_core::Database;

#[derive(Args)]
pub struct HistoryArgs {
    /// Number of sessions to show
    #[arg(long, default_value = "10")]
    limit: usize,
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let rows = db.recent_sessions(args.limit)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("no completed sessions");
        return Ok(());
    }
    for row in rows {
        println!(
            "{}  {:<10}  {:>3}m",
            row.completed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            row.session_type.as_str(),
            row.duration_secs / 60
        );
    }
    Ok(())
}
