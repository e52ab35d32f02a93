use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long one spin is announced to run, server-authoritative.
pub const SPIN_DURATION_MS: i64 = 5000;
/// Extra window after the spin duration before anyone may force a release.
pub const RELEASE_GRACE_MS: i64 = 2000;

/// Weight given to every regular item of the requested tier.
pub const BASE_WEIGHT: u32 = 10;
/// Weight given to items sampled in from other tiers (rarer per segment).
pub const UPGRADE_WEIGHT: u32 = 5;
/// Weight of the single coin-bonus segment.
pub const BONUS_WEIGHT: u32 = 8;
/// Weight of the guaranteed respin segment.
pub const RESPIN_WEIGHT: u32 = BASE_WEIGHT;

/// Supported wager tiers. The cost doubles as the catalog partition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    T50,
    T100,
    T200,
    T500,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::T50, Tier::T100, Tier::T200, Tier::T500];

    pub fn cost(self) -> i64 {
        match self {
            Tier::T50 => 50,
            Tier::T100 => 100,
            Tier::T200 => 200,
            Tier::T500 => 500,
        }
    }

    pub fn from_wager(wager: i64) -> Option<Tier> {
        Tier::ALL.iter().copied().find(|t| t.cost() == wager)
    }

    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::T50 => Some(Tier::T100),
            Tier::T100 => Some(Tier::T200),
            Tier::T200 => Some(Tier::T500),
            Tier::T500 => None,
        }
    }

    /// Amount of the coin-bonus segment: the next tier's entry cost, or
    /// double the own cost at the top tier.
    pub fn bonus_amount(self) -> i64 {
        match self.next() {
            Some(next) => next.cost(),
            None => self.cost() * 2,
        }
    }

    /// Which other tiers contribute upgrade segments, and how many samples
    /// each contributes. Samples are drawn with replacement.
    pub fn upgrade_draws(self) -> &'static [(Tier, usize)] {
        match self {
            Tier::T50 => &[(Tier::T100, 2)],
            Tier::T100 => &[(Tier::T200, 2), (Tier::T500, 1)],
            Tier::T200 => &[(Tier::T500, 2)],
            // No higher tier exists, so the top wheel pulls from below.
            Tier::T500 => &[(Tier::T200, 2)],
        }
    }
}

/// One active prize item as published by the admin catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: Uuid,
    pub name: String,
    /// Entry cost of the tier this item belongs to.
    pub tier: i64,
    pub image_ref: Option<String>,
}

/// What a segment pays out. This is the full display-safe content; the
/// server-only part of a segment is its weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prize {
    Item {
        id: Uuid,
        name: String,
        image_ref: Option<String>,
    },
    Coins {
        amount: i64,
    },
    Respin,
}

impl Prize {
    pub fn description(&self) -> String {
        match self {
            Prize::Item { name, .. } => name.clone(),
            Prize::Coins { amount } => format!("{} coins", amount),
            Prize::Respin => "Respin".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub prize: Prize,
    pub weight: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpinStatus {
    Idle,
    Spinning,
    Result,
}

impl SpinStatus {
    pub fn parse(s: &str) -> Option<SpinStatus> {
        match s {
            "idle" => Some(SpinStatus::Idle),
            "spinning" => Some(SpinStatus::Spinning),
            "result" => Some(SpinStatus::Result),
            _ => None,
        }
    }
}

/// The projection every client polls. Carries no weights and no result
/// index until the spin has settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelState {
    pub status: SpinStatus,
    pub owner_name: Option<String>,
    pub wager: Option<i64>,
    pub segments: Vec<Prize>,
    pub result_index: Option<usize>,
    pub started_at_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

// === API Types ===

#[derive(Debug, Serialize, Deserialize)]
pub struct SpinRequest {
    pub wager: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinRecordView {
    pub username: String,
    pub wager: i64,
    pub prize: String,
    pub created_at_ms: i64,
}

/// Build the weighted segment list for one spin of tier `tier`.
///
/// `catalog` is the full active-item snapshot across all tiers; inactive
/// items must already be filtered out by the catalog reader. The list is
/// rebuilt for every spin because the catalog is mutable between spins.
/// The result always contains at least the coin-bonus and respin segments.
pub fn build_segments<R: Rng>(tier: Tier, catalog: &[CatalogItem], rng: &mut R) -> Vec<Segment> {
    let mut segments = Vec::new();

    for item in catalog.iter().filter(|i| i.tier == tier.cost()) {
        segments.push(Segment {
            prize: item_prize(item),
            weight: BASE_WEIGHT,
        });
    }

    for &(source, samples) in tier.upgrade_draws() {
        let pool: Vec<&CatalogItem> = catalog.iter().filter(|i| i.tier == source.cost()).collect();
        if pool.is_empty() {
            continue;
        }
        for _ in 0..samples {
            let item = pool[rng.gen_range(0..pool.len())];
            segments.push(Segment {
                prize: item_prize(item),
                weight: UPGRADE_WEIGHT,
            });
        }
    }

    segments.push(Segment {
        prize: Prize::Coins {
            amount: tier.bonus_amount(),
        },
        weight: BONUS_WEIGHT,
    });
    segments.push(Segment {
        prize: Prize::Respin,
        weight: RESPIN_WEIGHT,
    });

    segments
}

fn item_prize(item: &CatalogItem) -> Prize {
    Prize::Item {
        id: item.id,
        name: item.name.clone(),
        image_ref: item.image_ref.clone(),
    }
}

/// Strip the server-only weight field for broadcasting.
pub fn project_segments(segments: &[Segment]) -> Vec<Prize> {
    segments.iter().map(|s| s.prize.clone()).collect()
}

pub fn total_weight(segments: &[Segment]) -> u64 {
    segments.iter().map(|s| s.weight as u64).sum()
}

/// Map a uniform draw in `[0, total_weight)` to a segment index: the first
/// index whose cumulative weight strictly exceeds the draw wins, so a draw
/// landing exactly on a boundary resolves to the earlier segment.
pub fn index_for_draw(segments: &[Segment], draw: f64) -> usize {
    debug_assert!(!segments.is_empty());
    let mut cumulative = 0u64;
    for (i, segment) in segments.iter().enumerate() {
        cumulative += segment.weight as u64;
        if (cumulative as f64) > draw {
            return i;
        }
    }
    // Only reachable if the draw equals the total through float rounding.
    segments.len() - 1
}

/// Draw one winning index, probability `weight[i] / total`.
pub fn pick_index<R: Rng>(segments: &[Segment], rng: &mut R) -> usize {
    let total = total_weight(segments);
    index_for_draw(segments, rng.gen_range(0.0..total as f64))
}
