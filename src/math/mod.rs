//! Fixed-point sqrt-price/tick math and amount-delta formulas.

pub mod fixed_point;
