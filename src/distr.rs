//! Distributions to draw branch lengths of simulated trees

use clap::ValueEnum;
use rand::Rng;
use rand_distr::{Distribution, Exp, Gamma, Uniform};

use crate::tree::{EdgeLength, TreeError};

const UNIFORM_RANGE: (EdgeLength, EdgeLength) = (0.002, 1.0);
const EXPONENTIAL_RATE: EdgeLength = 0.15;
const GAMMA_SHAPE: EdgeLength = 4.0;
const GAMMA_SCALE: EdgeLength = 1.0;

/// Available branch length distributions
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Distr {
    /// Every branch has a length of 1
    Unit,
    /// A [uniform](https://en.wikipedia.org/wiki/Continuous_uniform_distribution)
    /// distribution over $[0.002, 1.0)$
    Uniform,
    /// An [exponential](https://en.wikipedia.org/wiki/Exponential_distribution)
    /// distribution with rate $\lambda=0.15$
    Exponential,
    /// A [gamma](https://en.wikipedia.org/wiki/Gamma_distribution) distribution
    /// with a shape $k=4$ and scale $\theta=1.0$.
    Gamma,
}

/// Draws branch lengths from one of the [`Distr`] distributions
#[derive(Debug, Clone)]
pub(crate) enum Sampler {
    Constant(EdgeLength),
    Uniform(Uniform<EdgeLength>),
    Exponential(Exp<EdgeLength>),
    Gamma(Gamma<EdgeLength>),
}

impl Sampler {
    pub(crate) fn new(distr: Distr) -> Result<Self, TreeError> {
        let sampler = match distr {
            Distr::Unit => Self::Constant(1.0),
            Distr::Uniform => Self::Uniform(Uniform::new(UNIFORM_RANGE.0, UNIFORM_RANGE.1)),
            Distr::Exponential => Self::Exponential(
                Exp::new(EXPONENTIAL_RATE).map_err(|_| TreeError::InvalidDistribution(distr))?,
            ),
            Distr::Gamma => Self::Gamma(
                Gamma::new(GAMMA_SHAPE, GAMMA_SCALE)
                    .map_err(|_| TreeError::InvalidDistribution(distr))?,
            ),
        };

        Ok(sampler)
    }
}

impl Distribution<EdgeLength> for Sampler {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> EdgeLength {
        match self {
            Sampler::Constant(c) => *c,
            Sampler::Uniform(u) => u.sample(rng),
            Sampler::Exponential(e) => e.sample(rng),
            Sampler::Gamma(g) => g.sample(rng),
        }
    }
}
