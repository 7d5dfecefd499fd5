//! Example: mine a small corpus, persist the patterns, and compress with them.
//!
//! Run with: cargo run --example train_and_compress --release

use tps_compression::{PatternStore, SubstitutionCompressor, Trainer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let corpus = [
        "[REQ:ANALYZE] [TARGET:TRANSCRIPT] [EXTRACT:ISSUE] [OUT:JSON]",
        "[REQ:ANALYZE] [TARGET:TRANSCRIPT] [EXTRACT:SENTIMENT] [OUT:JSON]",
        "[REQ:ANALYZE] [TARGET:TRANSCRIPT] [EXTRACT:ACTION_ITEMS] [OUT:JSON]",
        "[REQ:SUMMARIZE] [TARGET:DOCUMENT] [LEN:SHORT] [OUT:MARKDOWN]",
        "[REQ:SUMMARIZE] [TARGET:DOCUMENT] [LEN:LONG] [OUT:MARKDOWN]",
    ];
    let originals = [
        "Analyze this call transcript and list the customer's issues as JSON",
        "Analyze this call transcript and report the sentiment as JSON",
        "Analyze this call transcript and extract action items as JSON",
        "Write a short summary of the document in markdown",
        "Write a long summary of the document in markdown",
    ];

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("patterns.json");

    println!("=== Training ===\n");
    let mut store = PatternStore::open(&path)?;
    let report = Trainer::new().train_with_originals(&mut store, &corpus, Some(&originals[..]))?;
    println!("{}", report);

    println!("=== Store ===\n");
    let stats = store.stats();
    println!("Patterns: {}", stats.total_patterns);
    println!("Total uses: {}", stats.total_uses);
    println!("Tokens saved in training corpus: {}", stats.total_tokens_saved);
    println!("Average gain: {:.2}", stats.avg_compression_gain);

    println!("\n=== Compression ===\n");
    let compressor = SubstitutionCompressor::new(&store);
    let input = "[REQ:ANALYZE] [TARGET:TRANSCRIPT] [EXTRACT:ISSUE] [OUT:JSON]";
    let result = compressor.compress(input, None);
    println!("Input:  {}", input);
    println!("Output: {}", result.text);
    println!(
        "Tokens: {} -> {} (saved {})",
        result.metadata.original_tokens, result.metadata.final_tokens, result.metadata.tokens_saved
    );
    for usage in &result.metadata.patterns_used {
        println!("  {} = {}", usage.ref_token, usage.pattern);
    }

    println!("\nExpanded: {}", compressor.expand(&result.text)?);
    Ok(())
}
