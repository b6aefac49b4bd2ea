//! Trail-search drivers: greedy descent and clone-based backtracking.
//!
//! Both drivers repeatedly pick an S-box that still has unknown bits,
//! commit one of its ranked concrete transitions and let the engine
//! propagate. The greedy driver always takes the best transition and gives
//! up on the first contradiction; the backtracking driver walks the ranked
//! alternatives of a cloned branch until a full trail survives propagation
//! or the node budget runs out.

use indicatif::ProgressBar;
use itertools::Itertools;

use tern::permutation::Permutation;

/// Minimal progress surface the search emits to.
pub trait StyledProgress {
    fn inc(&self, delta: u64);
    fn set_message(&self, msg: &str);
    fn finish_with_message(&self, msg: &str);
}

/// Factory handing a progress bar to each search run.
pub trait SPFactory {
    type ProgressBar: StyledProgress;

    fn new_search_progress(&self, len: u64) -> Self::ProgressBar;
}

/// indicatif-backed default factory.
#[derive(Debug, Clone)]
pub struct SearchProgress;

impl SPFactory for SearchProgress {
    type ProgressBar = StyledSearchBar;

    fn new_search_progress(&self, len: u64) -> StyledSearchBar {
        StyledSearchBar {
            pb: ProgressBar::new(len),
        }
    }
}

#[derive(Debug)]
pub struct StyledSearchBar {
    pb: ProgressBar,
}

impl StyledProgress for StyledSearchBar {
    fn inc(&self, delta: u64) {
        self.pb.inc(delta);
    }

    fn set_message(&self, msg: &str) {
        self.pb.set_message(msg);
    }

    fn finish_with_message(&self, msg: &str) {
        self.pb.finish_with_message(msg);
    }
}

/// No-output factory for tests and batch runs.
#[derive(Debug, Clone)]
pub struct SilentProgress;

impl SPFactory for SilentProgress {
    type ProgressBar = SilentBar;

    fn new_search_progress(&self, _len: u64) -> SilentBar {
        SilentBar
    }
}

#[derive(Debug)]
pub struct SilentBar;

impl StyledProgress for SilentBar {
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: &str) {}
    fn finish_with_message(&self, _msg: &str) {}
}

/// A fully resolved characteristic and its aggregate weight.
#[derive(Debug, Clone)]
pub struct FoundTrail {
    pub permutation: Permutation,
    pub sign: i8,
    pub log2: f64,
}

impl FoundTrail {
    /// One-line summary of the trail's weight and active S-boxes.
    pub fn summary(&self) -> String {
        let active: Vec<String> = (0..self.permutation.rounds())
            .map(|r| {
                let layer = self.permutation.sbox_layer(r);
                let count = (0..layer.num_sboxes())
                    .filter(|i| {
                        let x = layer.vertical_mask(*i, self.permutation.state(2 * r));
                        x.value().map(|v| v != 0).unwrap_or(false)
                    })
                    .count();
                format!("r{}: {}", r, count)
            })
            .collect();
        format!(
            "weight 2^{:.2} (sign {:+}), active S-boxes per round: {}",
            self.log2,
            self.sign,
            active.iter().join(", ")
        )
    }
}

pub struct TrailSearch<F: SPFactory> {
    progress: F,
    /// Number of committed transitions the backtracking driver may try
    /// before giving up.
    node_budget: usize,
}

impl<F: SPFactory> TrailSearch<F> {
    pub fn new(progress: F, node_budget: usize) -> Self {
        TrailSearch {
            progress,
            node_budget,
        }
    }

    /// Greedy descent: always commit the best-biased transition of the
    /// most constrained open S-box. Fast, but gives up on the first
    /// contradiction.
    pub fn greedy(&self, mut permutation: Permutation) -> Option<FoundTrail> {
        let bar = self.progress.new_search_progress(self.node_budget as u64);
        loop {
            let open = permutation.guessable();
            if open.is_empty() {
                bar.finish_with_message("trail resolved");
                return finish(permutation);
            }
            let (round, index) = most_constrained(&permutation, &open);
            bar.inc(1);
            bar.set_message(&format!("round {} box {}", round, index));
            if !permutation.commit_best(round, index) {
                bar.finish_with_message("contradiction");
                return None;
            }
        }
    }

    /// Branch-and-bound over ranked transitions. Each branch works on a
    /// clone, so abandoning it is dropping it.
    pub fn backtracking(&self, permutation: Permutation) -> Option<FoundTrail> {
        let bar = self.progress.new_search_progress(self.node_budget as u64);
        let mut nodes = 0usize;
        let found = self.descend(permutation, &mut nodes, &bar);
        match found {
            Some(_) => bar.finish_with_message("trail found"),
            None => bar.finish_with_message("search exhausted"),
        }
        found
    }

    fn descend(
        &self,
        permutation: Permutation,
        nodes: &mut usize,
        bar: &F::ProgressBar,
    ) -> Option<FoundTrail> {
        let open = permutation.guessable();
        if open.is_empty() {
            return finish(permutation);
        }
        let (round, index) = most_constrained(&permutation, &open);

        let mut pos = 0;
        loop {
            if *nodes >= self.node_budget {
                return None;
            }
            *nodes += 1;
            bar.inc(1);

            let mut branch = permutation.clone();
            let (count, feasible) = branch.commit_ranked(round, index, pos);
            if feasible {
                if let Some(trail) = self.descend(branch, nodes, bar) {
                    return Some(trail);
                }
            }
            pos += 1;
            if pos >= count {
                return None;
            }
        }
    }
}

/// Pick the open S-box with the fewest unknown bits: the cheapest one to
/// resolve and the one pruning the search tree hardest.
fn most_constrained(permutation: &Permutation, open: &[(usize, usize)]) -> (usize, usize) {
    *open
        .iter()
        .min_by_key(|(round, index)| {
            let layer = permutation.sbox_layer(*round);
            let x = layer.vertical_mask(*index, permutation.state(2 * round));
            let y = layer.vertical_mask(*index, permutation.state(2 * round + 1));
            x.unknown_count() + y.unknown_count()
        })
        .expect("most_constrained called with no open boxes")
}

fn finish(permutation: Permutation) -> Option<FoundTrail> {
    let (sign, log2) = permutation.trail_probability()?;
    Some(FoundTrail {
        permutation,
        sign,
        log2,
    })
}
