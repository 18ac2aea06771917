//! Multiplier engine
//!
//! Indirect sources are raw extracts adjusted by an ordered list of
//! multipliers. Each multiplier reads its value from a processed source or a
//! reference and folds it into every band.

mod engine;
mod lookup;
mod spec;

pub use engine::{
    apply_multipliers, resolve_lookup, AppliedMultiplier, MultiplierContext, MultiplierOutcome,
};
pub use lookup::{MultiplierLookup, MultiplierOrigin};
pub use spec::{MultiplierFilter, MultiplierOperation, MultiplierSpec};
