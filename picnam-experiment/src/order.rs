//! Participant-specific, reproducible trial orders.

use super::config::{SessionConfig, StartPolicy};
use super::rng::{Mulberry32, unit_f64};
use picnam_core::{Result, SessionError, StimulusItem, StimulusList, TargetWord};
use rand::RngCore;
use std::collections::HashSet;
use tracing::debug;

/// Concatenated decimal digits of a participant id read as a double, `0`
/// if there are none.
///
/// Ids with more than 15 digits round to the nearest representable value
/// and ids beyond the double range read as infinity; seeds and parity are
/// derived from that value so long ids keep their established orders.
pub fn parse_numeric_id(participant_id: &str) -> f64 {
    let digits: String = participant_id.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return 0.0;
    }
    digits.parse().unwrap_or(f64::INFINITY)
}

/// `n * 1000 + offset` in double precision, truncated and wrapped modulo
/// 2^32. A non-finite value gives 0.
pub fn derive_seed(numeric_id: f64, offset: u32) -> u32 {
    let x = numeric_id * 1000.0 + f64::from(offset);
    if !x.is_finite() {
        return 0;
    }
    x.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// Index of `numeric_id` modulo `k`; a non-finite id counts as 0.
fn residue(numeric_id: f64, k: usize) -> usize {
    let r = numeric_id % k as f64;
    if r.is_finite() { r as usize } else { 0 }
}

/// Fisher-Yates shuffle of a copy of `items`, walking from the back.
pub fn seeded_shuffle<T: Clone, R: RngCore + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut shuffled = items.to_vec();
    for i in (1..shuffled.len()).rev() {
        let j = (unit_f64(rng.next_u32()) * (i + 1) as f64) as usize;
        shuffled.swap(i, j);
    }
    shuffled
}

/// Takes one item per step from each list in turn, beginning with `start`.
///
/// The turn advances every step even when the scheduled list is exhausted;
/// the step is then served by the next list in turn that still has items.
pub fn interleave<T>(lists: Vec<Vec<T>>, start: usize) -> Vec<T> {
    let k = lists.len();
    let total = lists.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    let mut iters: Vec<_> = lists.into_iter().map(Vec::into_iter).collect();
    let mut turn = start;
    while out.len() < total {
        if let Some(item) = (0..k).find_map(|offset| iters[(turn + offset) % k].next()) {
            out.push(item);
        }
        turn = (turn + 1) % k;
    }
    out
}

/// A fixed trial sequence. Built once per session and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOrder {
    items: Vec<StimulusItem>,
    numeric_id: f64,
    seed: u32,
}

impl TrialOrder {
    pub fn items(&self) -> &[StimulusItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StimulusItem> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StimulusItem> {
        self.items.iter()
    }

    pub fn word_ids(&self) -> Vec<u32> {
        self.items.iter().map(|item| item.word_id).collect()
    }

    pub fn numeric_id(&self) -> f64 {
        self.numeric_id
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }
}

impl<'a> IntoIterator for &'a TrialOrder {
    type Item = &'a StimulusItem;
    type IntoIter = std::slice::Iter<'a, StimulusItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[derive(Debug, Clone)]
pub struct OrderGenerator {
    pub seed_offset: u32,
    pub start_policy: StartPolicy,
    pub image_ext: String,
}

impl OrderGenerator {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            seed_offset: config.seed_offset,
            start_policy: config.start_policy,
            image_ext: config.image_ext.clone(),
        }
    }

    pub fn build(&self, participant_id: &str, lists: &[StimulusList]) -> Result<TrialOrder> {
        let participant_id = participant_id.trim();
        if participant_id.is_empty() {
            return Err(SessionError::config("participant id is empty"));
        }
        if lists.is_empty() {
            return Err(SessionError::config("at least one stimulus list is required"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = lists
            .iter()
            .flat_map(|l| &l.items)
            .find(|item| !seen.insert(item.id))
        {
            return Err(SessionError::config(format!(
                "word id {} appears more than once",
                dup.id
            )));
        }

        let numeric_id = parse_numeric_id(participant_id);
        let seed = derive_seed(numeric_id, self.seed_offset);
        let mut rng = Mulberry32::new(seed);

        let shuffled: Vec<_> = lists
            .iter()
            .map(|l| seeded_shuffle(&l.items, &mut rng))
            .collect();

        let targets: Vec<TargetWord> = if shuffled.len() == 1 {
            shuffled.into_iter().flatten().collect()
        } else {
            let k = shuffled.len();
            let start = match self.start_policy {
                // n odd -> first list when k == 2
                StartPolicy::Parity => (residue(numeric_id, k) + k - 1) % k,
                StartPolicy::RandomDraw => ((rng.next_f64() * k as f64) as usize).min(k - 1),
            };
            interleave(shuffled, start)
        };

        let items: Vec<StimulusItem> = targets
            .iter()
            .map(|t| StimulusItem::from_target(t, &self.image_ext))
            .collect();
        debug!(participant_id, numeric_id, seed, trials = items.len(), "trial order built");

        Ok(TrialOrder {
            items,
            numeric_id,
            seed,
        })
    }
}
