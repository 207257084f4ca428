//! # Random Portfolio Scatter
//!
//! $$
//! w=\frac{(e_1,\dots,e_n)}{\sum_i e_i},\qquad e_i\sim\operatorname{Exp}(1)
//! $$
//!
//! Uniform draws from the long-only simplex, for plotting the attainable
//! (risk, return) cloud next to the frontier.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Exp1;

use crate::risk::linalg::quad_form;
use crate::risk::MarketMoments;
use crate::types::FrontierPoint;

/// `samples` random long-only portfolios drawn with a fixed `seed`.
pub fn random_portfolios(moments: &MarketMoments, samples: usize, seed: u64) -> Vec<FrontierPoint> {
  let n = moments.n_assets();
  if n == 0 {
    return Vec::new();
  }

  let mut rng = StdRng::seed_from_u64(seed);
  (0..samples)
    .map(|_| {
      let e = DVector::<f64>::from_fn(n, |_, _| Exp1.sample(&mut rng));
      let w = &e / e.sum();
      let risk = quad_form(&w, &moments.cov).max(0.0).sqrt();
      FrontierPoint::new(risk, moments.mu.dot(&w))
    })
    .collect()
}
