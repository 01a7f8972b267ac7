//! # Statistics Module
//!
//! Cell-wise statistics of the particle population.
//!
//! - `moments`: mass-weighted moments per cell (mass, volume, momentum, Reynolds stresses,
//!   scalar means and variances), accumulated as an exponentially weighted time average
//! - `population`: classification of cells by particle count, cloning and elimination with exact
//!   conservation of mass, momentum and scalar content

pub mod moments;
pub mod population;

mod moments_tests;
