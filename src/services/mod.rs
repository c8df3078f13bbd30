pub mod evaluator;
pub mod model;
pub mod pipeline;
pub mod recommendations;
pub mod sampler;
pub mod trainer;

pub use evaluator::{Evaluator, Metric};
pub use model::{FittedModel, LatentFactors, RankingModel};
pub use pipeline::TrainedSnapshot;
pub use recommendations::RecommendationService;
pub use sampler::{NegativeSampleSynthesizer, SamplingConfig};
pub use trainer::{AlsParams, ModelTrainer};
