//! Operator CLI subcommands.

use anyhow::Result;

use crate::config::EngramConfig;
use crate::db;

/// `engram doctor` — open the database and print a health report.
pub fn doctor(config: &EngramConfig) -> Result<()> {
    let conn = db::open_database(config.resolved_db_path(), config.vector.dimensions)?;
    let report = db::check_database_health(&conn)?;

    println!("Engram database health");
    println!("  path:               {}", config.storage.db_path);
    println!("  schema version:     {}", report.schema_version);
    println!(
        "  vector dimensions:  {}",
        report
            .vector_dimensions
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!("  sqlite-vec:         {}", report.sqlite_vec_version);
    println!(
        "  integrity:          {}",
        if report.integrity_ok { "ok" } else { &report.integrity_details }
    );
    println!("  memories:           {}", report.memory_count);
    println!("  situations:         {}", report.situation_count);
    println!("  annotations:        {}", report.annotation_count);

    if !report.integrity_ok {
        anyhow::bail!("integrity check failed");
    }
    Ok(())
}
