// src/engine/service.rs
// Per-block evaluation pass and the block loop that drives it.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use num_bigint::BigInt;
use tokio::sync::mpsc;

use crate::chain::markets::Market;
use crate::engine::evaluate::{evaluate_arb, screen_float, EvaluationParams, Leg};
use crate::error::SubmitError;
use crate::models::{EvaluationResult, TierChoices};

pub type SharedMarket = Arc<dyn Market + Send + Sync>;

// ---- Collaborators ----

/// Market state as of one block.
#[derive(Clone)]
pub struct MarketSnapshot {
    pub hub_markets: Vec<SharedMarket>,
    pub cp_markets: Vec<SharedMarket>,
    pub base_fee_per_gas: BigInt,
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn load(&self) -> anyhow::Result<MarketSnapshot>;
}

#[async_trait]
pub trait ArbSubmitter: Send + Sync {
    async fn submit(&self, result: &EvaluationResult) -> Result<(), SubmitError>;
}

/// Accepts everything and only logs it.
pub struct DryRunSubmitter;

#[async_trait]
impl ArbSubmitter for DryRunSubmitter {
    async fn submit(&self, result: &EvaluationResult) -> Result<(), SubmitError> {
        let mask = |c: &Option<TierChoices>| c.as_ref().map(|c| c.to_mask());
        log::info!(
            "dry run: {} via {} ({:?}) and {} ({:?})",
            result.brief(),
            result.market1.id,
            mask(&result.tier_choices1),
            result.market2.id,
            mask(&result.tier_choices2),
        );
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockEvent {
    pub number: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ServiceParams {
    pub evaluation: EvaluationParams,
    /// Skip pairs whose float-tier probe loses money in both directions.
    pub float_screening: bool,
}

// ---- Evaluation pass ----

#[derive(Debug, Default)]
pub struct PassSummary {
    pub pairs: usize,
    /// Sorted by profit, best first.
    pub opportunities: Vec<EvaluationResult>,
    pub submitted: Option<EvaluationResult>,
}

fn same_pair(a: &dyn Market, b: &dyn Market) -> bool {
    a.token0().address == b.token0().address && a.token1().address == b.token1().address
}

/// Evaluates both directions of every hub / constant-product pair that share
/// a WETH pair. Failed evaluations are logged and skipped.
pub fn evaluate_snapshot(snapshot: &MarketSnapshot, params: &ServiceParams) -> PassSummary {
    let weth = params.evaluation.weth;
    let mut summary = PassSummary::default();

    for hub in &snapshot.hub_markets {
        if hub.token0().address != weth && hub.token1().address != weth {
            log::debug!("hub {} does not trade WETH", hub.info().id);
            continue;
        }
        let Some(cp) = snapshot
            .cp_markets
            .iter()
            .find(|&cp| same_pair(hub.as_ref(), cp.as_ref()))
        else {
            log::debug!("no constant-product pair for hub {}", hub.info().id);
            continue;
        };
        summary.pairs += 1;

        let (token_in, token_bridge) = if hub.token0().address == weth {
            (hub.token0(), hub.token1())
        } else {
            (hub.token1(), hub.token0())
        };

        let directions = [(hub, cp), (cp, hub)];

        if params.float_screening {
            let promising = directions.iter().any(|&(m1, m2)| {
                let (leg1, leg2) = (Leg::new(m1.as_ref()), Leg::new(m2.as_ref()));
                match screen_float(&leg1, &leg2, token_in, token_bridge, &params.evaluation) {
                    Ok(net) => net > 0.0,
                    Err(e) => {
                        log::debug!("float screen failed: {}", e);
                        true
                    }
                }
            });
            if !promising {
                log::debug!("{}/{} screened out", token_in, token_bridge);
                continue;
            }
        }

        for (m1, m2) in directions {
            let (leg1, leg2) = (Leg::new(m1.as_ref()), Leg::new(m2.as_ref()));
            let note = format!(
                "{} -> [{}] -> {} -> [{}]",
                token_in,
                m1.info().kind,
                token_bridge,
                m2.info().kind
            );
            let started = Instant::now();
            match evaluate_arb(
                &leg1,
                &leg2,
                token_in,
                token_bridge,
                &snapshot.base_fee_per_gas,
                &params.evaluation,
            ) {
                Ok(res) => {
                    log::info!("{} ({:?})", res.brief(), started.elapsed());
                    summary.opportunities.push(res);
                }
                Err(e) if e.is_evaluation_failure() => log::debug!("{}: {}", note, e),
                Err(e) => log::warn!("{}: simulation failed, skipping: {}", note, e),
            }
        }
    }

    summary
        .opportunities
        .sort_by(|a, b| b.profit.cmp(&a.profit));
    summary
}

/// Loads a snapshot, evaluates it and submits the best opportunity the
/// submitter accepts.
pub async fn run_once(
    source: &dyn MarketSource,
    submitter: &dyn ArbSubmitter,
    params: &ServiceParams,
) -> anyhow::Result<PassSummary> {
    let start = Instant::now();
    let snapshot = source.load().await?;
    log::debug!("snapshot loaded in {:?}", start.elapsed());

    let mut summary = evaluate_snapshot(&snapshot, params);
    log::info!(
        "{} pairs evaluated, {} opportunities",
        summary.pairs,
        summary.opportunities.len()
    );

    for res in &summary.opportunities {
        match submitter.submit(res).await {
            Ok(()) => {
                log::info!("submitted: {}", res.brief());
                summary.submitted = Some(res.clone());
                break;
            }
            Err(SubmitError::Skip(reason)) => log::warn!("submission skipped: {}", reason),
            Err(SubmitError::Fatal(e)) => return Err(e.context("submission failed")),
        }
    }

    Ok(summary)
}

// ---- Block loop ----

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub processed: Vec<u64>,
    pub dropped: Vec<u64>,
}

/// Runs one pass per block until the channel closes. Blocks that are already
/// stale when picked up (a newer one is queued) are dropped.
pub async fn run(
    source: &dyn MarketSource,
    submitter: &dyn ArbSubmitter,
    params: &ServiceParams,
    mut blocks: mpsc::Receiver<BlockEvent>,
) -> LoopStats {
    let mut stats = LoopStats::default();

    while let Some(mut block) = blocks.recv().await {
        while let Ok(newer) = blocks.try_recv() {
            log::warn!("skipping stale block {}", block.number);
            stats.dropped.push(block.number);
            block = newer;
        }

        log::info!("block {}", block.number);
        let start = Instant::now();
        if let Err(e) = run_once(source, submitter, params).await {
            log::error!("block {}: evaluation pass failed: {:#}", block.number, e);
        }
        log::info!("block {} done in {:?}", block.number, start.elapsed());
        stats.processed.push(block.number);
    }

    log::info!("block stream closed");
    stats
}
