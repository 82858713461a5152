//! Per-PC, per-trace and corpus metrics from simulator snapshots
use anyhow::Context;
use cbp_analysis::{
    AnalysisConfig, H2pSummary, OpTypeSummary, TopKShare, TraceAnalysis, TraceMetrics,
    WarmupCorrelation, WarmupShare, analyze_trace, attribute_warmup, default_snapshot_dir,
    get_tqdm_style, hard_to_predict, load_snapshots, optype_breakdown, top_k_contribution,
    warmup_mpki_correlation,
};
use chrono::Local;
use clap::Parser;
use cli_table::{Cell, Table, print_stdout};
use serde::Serialize;
use std::{fs::File, io::BufWriter, path::PathBuf};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory of `<length>_<type>-<n>.json[.zst]` snapshots
    #[arg(short, long, default_value_os_t = default_snapshot_dir())]
    snapshot_dir: PathBuf,

    /// Analysis config in JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write all results to this JSON file
    #[arg(short, long)]
    output_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct TraceWarmup {
    trace: String,
    shares: Vec<WarmupShare>,
}

#[derive(Serialize)]
struct AnalysisOutput {
    generated_at: String,
    traces: Vec<TraceMetrics>,
    top_k: Vec<TopKShare>,
    op_types: Vec<OpTypeSummary>,
    h2p: Vec<H2pSummary>,
    warmup: Vec<TraceWarmup>,
    warmup_correlation: Vec<WarmupCorrelation>,
}

fn print_traces(analyses: &[TraceAnalysis]) -> anyhow::Result<()> {
    let mut table = vec![];
    for analysis in analyses {
        let trace = &analysis.trace;
        table.push(vec![
            trace.id.trace_full.as_str().cell(),
            analysis.pcs.len().cell(),
            trace.n_instr.cell(),
            format!("{:.2}", trace.rates.accuracy * 100.0).cell(),
            format!("{:.4}", trace.rates.mpki).cell(),
            format!("{:.4}", trace.rates.directionality).cell(),
            format!("{:.4}", trace.rates.trans_rate).cell(),
            format!("{:.2}", trace.rates.pct_better_than_static * 100.0).cell(),
        ]);
    }
    let table = table.table().title(vec![
        "Trace".cell(),
        "PCs".cell(),
        "Executions".cell(),
        "Accuracy (%)".cell(),
        "MPKI".cell(),
        "Directionality".cell(),
        "Transition Rate".cell(),
        "Better Than Static (%)".cell(),
    ]);
    print_stdout(table)?;
    Ok(())
}

fn print_top_k(curve: &[TopKShare]) -> anyhow::Result<()> {
    println!("Share of trace MPKI due to the top K branches:");
    let mut table = vec![];
    for share in curve
        .iter()
        .filter(|share| share.k <= 10 || share.k % 10 == 0 || share.k == curve.len())
    {
        table.push(vec![
            share.k.cell(),
            format!("{:.2}", share.mean_share * 100.0).cell(),
        ]);
    }
    let table = table
        .table()
        .title(vec!["K".cell(), "MPKI Share (%)".cell()]);
    print_stdout(table)?;
    Ok(())
}

fn print_op_types(summaries: &[OpTypeSummary]) -> anyhow::Result<()> {
    let mut table = vec![];
    for summary in summaries {
        table.push(vec![
            summary.op_type.cell(),
            summary.pc_count.cell(),
            summary.dynamic_executions.cell(),
            format!("{:.2}", summary.rates.accuracy * 100.0).cell(),
            format!("{:.4}", summary.rates.mpki).cell(),
            format!("{:.4}", summary.rates.precision_taken).cell(),
            format!("{:.4}", summary.rates.recall_taken).cell(),
        ]);
    }
    let table = table.table().title(vec![
        "Type".cell(),
        "PCs".cell(),
        "Executions".cell(),
        "Accuracy (%)".cell(),
        "MPKI".cell(),
        "Taken Precision".cell(),
        "Taken Recall".cell(),
    ]);
    print_stdout(table)?;
    Ok(())
}

fn print_h2p(summaries: &[H2pSummary]) -> anyhow::Result<()> {
    let mut table = vec![];
    for summary in summaries {
        table.push(vec![
            summary.id.trace_full.as_str().cell(),
            summary.count.cell(),
            summary.executions.cell(),
            format!("{:.2}", summary.accuracy * 100.0).cell(),
            format!("{:.2}", summary.misprediction_share * 100.0).cell(),
        ]);
    }
    let table = table.table().title(vec![
        "Trace".cell(),
        "H2P Branches".cell(),
        "H2P Executions".cell(),
        "H2P Accuracy (%)".cell(),
        "H2P Misprediction Share (%)".cell(),
    ]);
    print_stdout(table)?;
    Ok(())
}

fn print_warmup(warmup: &[TraceWarmup], correlations: &[WarmupCorrelation]) -> anyhow::Result<()> {
    let mut table = vec![];
    for trace in warmup {
        for share in &trace.shares {
            table.push(vec![
                trace.trace.as_str().cell(),
                format!("{}%", share.pct).cell(),
                share.missed_warmup.cell(),
                format!("{:.1}", share.missed_total).cell(),
                format!("{:.2}", share.warmup_share * 100.0).cell(),
            ]);
        }
    }
    let table = table.table().title(vec![
        "Trace".cell(),
        "Window".cell(),
        "Warmup Mispredictions".cell(),
        "Total Mispredictions".cell(),
        "Warmup Share (%)".cell(),
    ]);
    print_stdout(table)?;

    let format_corr = |r: Option<f64>| r.map_or_else(|| "-".to_string(), |r| format!("{:.4}", r));
    let mut table = vec![];
    for correlation in correlations {
        table.push(vec![
            correlation.key.as_str().cell(),
            correlation.traces.cell(),
            format_corr(correlation.counter_vs_mpki).cell(),
            format_corr(correlation.normalized_vs_mpki).cell(),
        ]);
    }
    let table = table.table().title(vec![
        "Counter".cell(),
        "Traces".cell(),
        "Correlation With MPKI".cell(),
        "Normalized Correlation With MPKI".cell(),
    ]);
    print_stdout(table)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();
    let config = AnalysisConfig::load_or_default(args.config.as_ref())?;

    let snapshots = load_snapshots(&args.snapshot_dir)?;

    let pbar = indicatif::ProgressBar::new(snapshots.len() as u64);
    pbar.set_style(get_tqdm_style());
    pbar.set_message("Computing metrics");
    let mut analyses = vec![];
    let mut warmup = vec![];
    for snapshot in &snapshots {
        let analysis = analyze_trace(snapshot);
        warmup.push(TraceWarmup {
            trace: snapshot.id.trace_full.clone(),
            shares: attribute_warmup(&analysis.trace, &snapshot.warmup)?,
        });
        analyses.push(analysis);
        pbar.inc(1);
    }
    pbar.finish();

    let top_k = top_k_contribution(
        analyses.iter().map(|a| a.contributions.as_slice()),
        config.top_k,
    );
    let op_types = optype_breakdown(&analyses);
    let h2p: Vec<H2pSummary> = analyses
        .iter()
        .map(|a| hard_to_predict(a, &config.h2p))
        .collect();
    let warmup_correlation = warmup_mpki_correlation(
        analyses
            .iter()
            .zip(&warmup)
            .map(|(a, w)| (&a.trace, w.shares.as_slice())),
    );

    print_traces(&analyses)?;
    print_top_k(&top_k)?;
    print_op_types(&op_types)?;
    print_h2p(&h2p)?;
    print_warmup(&warmup, &warmup_correlation)?;

    if let Some(output_path) = &args.output_path {
        let output = AnalysisOutput {
            generated_at: Local::now().to_rfc3339(),
            traces: analyses.into_iter().map(|a| a.trace).collect(),
            top_k,
            op_types,
            h2p,
            warmup,
            warmup_correlation,
        };
        let file = File::create(output_path)
            .with_context(|| format!("Failed to create {}", output_path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &output)?;
        println!("Results written to {}", output_path.display());
    }
    Ok(())
}
