//! Rank CBP-16 submissions from their per-trace report files
use anyhow::Context;
use cbp_analysis::{
    AnalysisConfig, Ranking, ResultTable, SizeRanking, default_result_dir, rank_all_sizes,
    rank_size,
};
use clap::Parser;
use cli_table::{Cell, Table, print_stdout};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory with one folder per submission
    #[arg(short, long, default_value_os_t = default_result_dir())]
    result_dir: PathBuf,

    /// Analysis config in JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the cache path of the config
    #[arg(long)]
    cache_path: Option<PathBuf>,

    /// Reparse every report even if the cache is up to date
    #[arg(long)]
    no_cache: bool,

    /// Only rank this size class, e.g. 8KB
    #[arg(short, long)]
    size: Option<String>,

    /// Number of submissions to print per ranking
    #[arg(short, long, default_value_t = 10)]
    top: usize,
}

fn print_ranking(title: &str, ranking: &Ranking, top: usize) -> anyhow::Result<()> {
    println!("{}:", title);
    let mut table = vec![];
    for (i, (name, score)) in ranking.entries.iter().take(top).enumerate() {
        table.push(vec![
            (i + 1).cell(),
            name.cell(),
            format!("{:.4}", score).cell(),
        ]);
    }
    let table = table
        .table()
        .title(vec!["Rank".cell(), "Submission".cell(), "Score".cell()]);
    print_stdout(table)?;
    Ok(())
}

fn print_size(ranking: &SizeRanking, top: usize) -> anyhow::Result<()> {
    println!("Size class {}", ranking.size);
    if let Some((name, score)) = ranking.per_instruction.best() {
        println!("Best by mispredictions per 1K instructions: {} ({:.4})", name, score);
    }
    print_ranking("Mispredictions per 1K instructions", &ranking.per_instruction, top)?;
    print_ranking("Mispredictions per 1K branches", &ranking.per_branch, top)?;
    print_ranking(
        "Mispredictions per 1K conditional branches",
        &ranking.per_conditional,
        top,
    )?;
    print_ranking(
        "Total mispredictions per 1K total instructions",
        &ranking.weighted_per_instruction,
        top,
    )?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();
    let config = AnalysisConfig::load_or_default(args.config.as_ref())?;
    let cache_path = args.cache_path.unwrap_or(config.cache_path);

    let table = ResultTable::load_or_build(&args.result_dir, &cache_path, args.no_cache)
        .with_context(|| format!("Failed to load results from {}", args.result_dir.display()))?;
    let cache_display = pathdiff::diff_paths(&cache_path, std::env::current_dir()?)
        .unwrap_or_else(|| cache_path.clone());
    info!(
        "Loaded {} rows in {} columns, cached at {}",
        table.len(),
        table.columns().len(),
        cache_display.display()
    );

    let rankings = match &args.size {
        Some(size) => vec![rank_size(&table, size)],
        None => rank_all_sizes(&table),
    };
    for ranking in &rankings {
        print_size(ranking, args.top)?;
    }
    Ok(())
}
