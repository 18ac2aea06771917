//! Discounting and level-payment helpers

/// Annual discount factor to `years` at `rate`
pub fn discount_factor(rate: f64, years: i32) -> f64 {
    (1.0 + rate).powi(-years)
}

/// Net present value of annual cash flows, the first one at t = 0
pub fn npv(rate: f64, cashflows: &[f64]) -> f64 {
    cashflows
        .iter()
        .enumerate()
        .map(|(t, &cf)| cf * discount_factor(rate, t as i32))
        .sum()
}

/// Level payment repaying `principal` over `periods` years at `rate`.
///
/// `P·r·(1+r)^n / ((1+r)^n − 1)`, or `P / n` when the rate is zero.
pub fn annuity_payment(principal: f64, rate: f64, periods: u32) -> f64 {
    if periods == 0 {
        return principal;
    }
    if rate.abs() < 1e-12 {
        return principal / periods as f64;
    }
    let growth = (1.0 + rate).powi(periods as i32);
    principal * rate * growth / (growth - 1.0)
}
