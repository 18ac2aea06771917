//! Annual-period finance primitives used by the debt transformers and the
//! run summary

mod annuity;
mod irr;

pub use annuity::{annuity_payment, discount_factor, npv};
pub use irr::calculate_irr;
