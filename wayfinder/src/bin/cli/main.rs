use console::style;
use structopt::StructOpt;

use options::WfOptions;
use tern::mask::Bit;
use tern::permutation::Permutation;
use wayfinder::ciphers::{name_to_permutation, Mode};
use wayfinder::search::{SearchProgress, TrailSearch};

mod options;

fn main() {
    let (cipher, num_rounds, fixed_bits, node_budget, greedy, silent_mode, mode) =
        match WfOptions::from_args() {
            WfOptions::Lin {
                cipher,
                num_rounds,
                fixed_bits,
                node_budget,
                greedy,
                silent_mode,
            } => (
                cipher,
                num_rounds,
                fixed_bits,
                node_budget,
                greedy,
                silent_mode,
                Mode::Linear,
            ),
            WfOptions::Diff {
                cipher,
                num_rounds,
                fixed_bits,
                node_budget,
                greedy,
                silent_mode,
            } => (
                cipher,
                num_rounds,
                fixed_bits,
                node_budget,
                greedy,
                silent_mode,
                Mode::Differential,
            ),
        };

    let mut permutation = match name_to_permutation(&cipher, num_rounds, mode) {
        Some(p) => p,
        None => {
            println!("Cipher not supported. Check --help for supported ciphers.");
            return;
        }
    };

    println!(
        "Received cipher: {}, num rounds: {}, mode: {:?}, node budget: {}",
        style(&cipher).cyan(),
        num_rounds,
        mode,
        node_budget,
    );

    if !apply_fixed_bits(&mut permutation, &fixed_bits) {
        println!(
            "{}",
            style("The given constraints contradict each other, no trail exists.").red()
        );
        return;
    }

    let search = TrailSearch::new(SearchProgress, node_budget);
    let found = if greedy {
        search.greedy(permutation)
    } else {
        search.backtracking(permutation)
    };

    match found {
        Some(trail) => {
            println!("{}", style(trail.summary()).green());
            if !silent_mode {
                println!("{}", trail.permutation);
            }
        }
        None => println!("{}", style("No trail found within the budget.").yellow()),
    }
}

/// Parse and apply every state:word:bit:value constraint. Returns `false`
/// when a constraint contradicts the already propagated ones. Panics on a
/// malformed constraint string.
fn apply_fixed_bits(permutation: &mut Permutation, fixed_bits: &[String]) -> bool {
    for fix in fixed_bits {
        let fields: Vec<usize> = fix
            .split(':')
            .map(|f| {
                f.parse()
                    .unwrap_or_else(|_| panic!("Malformed constraint: {}", fix))
            })
            .collect();
        assert_eq!(
            fields.len(),
            4,
            "Constraints take the form state:word:bit:value, got: {}",
            fix
        );
        let value = match fields[3] {
            0 => Bit::Zero,
            1 => Bit::One,
            _ => panic!("Constraint value must be 0 or 1, got: {}", fix),
        };
        let num_states = 2 * permutation.rounds() + 1;
        assert!(
            fields[0] < num_states,
            "Constraint state index out of range (0..{}): {}",
            num_states,
            fix
        );
        let (words, bits) = {
            let state = permutation.state(fields[0]);
            (state.word_count(), state.bits_per_word())
        };
        assert!(
            fields[1] < words,
            "Constraint word index out of range (0..{}): {}",
            words,
            fix
        );
        assert!(
            fields[2] < bits,
            "Constraint bit index out of range (0..{}): {}",
            bits,
            fix
        );
        if !permutation.set_bit(value, fields[0], fields[1], fields[2]) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;

    fn toy() -> Permutation {
        name_to_permutation("pride", 1, Mode::Differential).unwrap()
    }

    #[test]
    fn in_range_constraints_apply() {
        let mut permutation = toy();
        assert!(apply_fixed_bits(&mut permutation, &["0:0:0:0".to_string()]));
        assert_eq!(permutation.state(0)[0].bit(0), Bit::Zero);
    }

    #[test]
    #[should_panic(expected = "state index out of range")]
    fn out_of_range_state_is_rejected() {
        apply_fixed_bits(&mut toy(), &["3:0:0:1".to_string()]);
    }

    #[test]
    #[should_panic(expected = "word index out of range")]
    fn out_of_range_word_is_rejected() {
        apply_fixed_bits(&mut toy(), &["0:8:0:1".to_string()]);
    }

    #[test]
    #[should_panic(expected = "bit index out of range")]
    fn out_of_range_bit_is_rejected() {
        apply_fixed_bits(&mut toy(), &["0:0:8:1".to_string()]);
    }

    #[test]
    #[should_panic(expected = "Malformed constraint")]
    fn malformed_constraint_is_rejected() {
        apply_fixed_bits(&mut toy(), &["0:0:zero".to_string()]);
    }
}
