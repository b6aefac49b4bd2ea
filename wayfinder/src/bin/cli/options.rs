use structopt::StructOpt;

#[derive(Clone, StructOpt)]
#[structopt(
name = "wayfinder",
about = "Linear and differential trail search over masked permutations."
)]
pub enum WfOptions {
    #[structopt(name = "linear")]
    Lin {
        #[structopt(short = "c", long = "cipher")]
        /// Name of the cipher to analyze.
        cipher: String,

        #[structopt(short = "r", long = "rounds")]
        num_rounds: usize,

        #[structopt(short = "x", long = "fix")]
        /// Bit constraints, each of the form state:word:bit:value, where
        /// state indexes the 2*rounds+1 intermediate states and value is
        /// 0 or 1. May be given several times.
        fixed_bits: Vec<String>,

        #[structopt(short = "b", long = "budget", default_value = "1048576")]
        /// Maximum number of committed transitions the backtracking
        /// search may try before giving up.
        node_budget: usize,

        #[structopt(short = "g", long = "greedy")]
        /// Run the greedy driver instead of the backtracking one.
        greedy: bool,

        #[structopt(short = "s")]
        /// Will hide the resolved trail if set. The one-line summary is
        /// still printed.
        silent_mode: bool,
    },

    #[structopt(name = "differential")]
    Diff {
        #[structopt(short = "c", long = "cipher")]
        /// Name of the cipher to analyze.
        cipher: String,

        #[structopt(short = "r", long = "rounds")]
        num_rounds: usize,

        #[structopt(short = "x", long = "fix")]
        /// Bit constraints, each of the form state:word:bit:value, where
        /// state indexes the 2*rounds+1 intermediate states and value is
        /// 0 or 1. May be given several times.
        fixed_bits: Vec<String>,

        #[structopt(short = "b", long = "budget", default_value = "1048576")]
        /// Maximum number of committed transitions the backtracking
        /// search may try before giving up.
        node_budget: usize,

        #[structopt(short = "g", long = "greedy")]
        /// Run the greedy driver instead of the backtracking one.
        greedy: bool,

        #[structopt(short = "s")]
        /// Will hide the resolved trail if set. The one-line summary is
        /// still printed.
        silent_mode: bool,
    },
}
