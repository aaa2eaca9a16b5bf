pub mod classifier;
pub mod connectivity;
pub mod covariance;
pub mod linalg;
pub mod masker;
pub mod output;
pub mod pipeline;
pub mod signal;
pub mod split;
pub mod stats;
pub mod vectorize;
