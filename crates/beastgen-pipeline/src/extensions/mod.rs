//! Built-in extensions.

mod marginal_likelihood;

pub use marginal_likelihood::MarginalLikelihoodExtension;
