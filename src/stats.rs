//! Source statistics overview.
//!
//! Prints what's indexed per source type (document counts plus the total
//! chunk count) so operators can confirm ingestion runs are landing.

use anyhow::Result;

use crate::index::VectorIndex;

/// Run the sources command: aggregate the index and print a summary.
pub async fn run_sources(index: &dyn VectorIndex) -> Result<()> {
    let stats = index.source_stats().await?;

    println!("Lorekeeper — Indexed Sources");
    println!("============================");
    println!();

    if stats.sources.is_empty() {
        println!("  (nothing indexed yet)");
    } else {
        println!("  {:<12} {:>10}", "SOURCE", "DOCUMENTS");
        println!("  {}", "-".repeat(24));
        for (source, count) in &stats.sources {
            println!("  {:<12} {:>10}", source.as_str(), count);
        }
    }

    println!();
    println!("  Total chunks: {}", stats.total_chunks);
    println!();

    Ok(())
}
