//! Counterexample-guided abstraction refinement for AIG model checking.
//!
//! The engine decides a single safety property of a sequential circuit by
//! keeping a growing gate-level abstraction, unrolling it over time frames
//! into an incremental SAT solver with proof logging, and reacting to each
//! solver answer: a satisfiable frame yields an abstract counterexample that
//! either survives concretely or pinpoints logic to pull into the
//! abstraction, while an unsatisfiable frame yields a proof core used to
//! shrink the abstraction back to what the proof actually touched.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::new_without_default)]

pub use cegar_aig as aig;
pub use cegar_sat as sat;

pub mod cnf;
pub mod gla;
pub mod params;
pub mod refine;
