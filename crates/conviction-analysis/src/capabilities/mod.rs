//! Capability implementations over the provider traits.

mod filings;
mod fundamentals;
mod history;
mod news;
mod sentiment;
mod synthesizer;
mod technical;

pub use filings::FilingsCapability;
pub use fundamentals::FundamentalsCapability;
pub use history::VerdictHistoryCapability;
pub use news::NewsCapability;
pub use sentiment::SentimentCapability;
pub use synthesizer::SynthesizerCapability;
pub use technical::TechnicalCapability;

use std::sync::Arc;

use conviction_engine::CapabilityRegistry;

use crate::providers::{
    EdgarClient, FilingsProvider, FundamentalsProvider, MarketDataProvider, NewsProvider,
    SentimentProvider, SyntheticProvider, YahooMarketData,
};
use crate::synthesis::{Synthesizer, WeightedSynthesizer};
use crate::verdict::VerdictStore;

/// Concrete providers behind the standard capability set.
pub struct ProviderSet {
    pub market: Arc<dyn MarketDataProvider>,
    pub fundamentals: Arc<dyn FundamentalsProvider>,
    pub sentiment: Arc<dyn SentimentProvider>,
    pub news: Arc<dyn NewsProvider>,
    pub filings: Arc<dyn FilingsProvider>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl ProviderSet {
    /// Fully synthetic set for offline runs.
    pub fn synthetic() -> Self {
        let synthetic = Arc::new(SyntheticProvider::new());
        Self {
            market: synthetic.clone(),
            fundamentals: synthetic.clone(),
            sentiment: synthetic.clone(),
            news: synthetic.clone(),
            filings: synthetic,
            synthesizer: Arc::new(WeightedSynthesizer::new()),
        }
    }

    /// Live adapters where they exist, synthetic stand-ins for the rest.
    ///
    /// Sentiment and news have no public upstream wired yet, so the offline
    /// generator covers them.
    pub fn live() -> Self {
        let synthetic = Arc::new(SyntheticProvider::new());
        let edgar = Arc::new(EdgarClient::from_env());
        Self {
            market: Arc::new(YahooMarketData::new()),
            fundamentals: edgar.clone(),
            sentiment: synthetic.clone(),
            news: synthetic,
            filings: edgar,
            synthesizer: Arc::new(WeightedSynthesizer::new()),
        }
    }
}

/// Wire the standard seven-capability registry.
pub fn standard_registry(providers: ProviderSet, verdicts: Arc<VerdictStore>) -> CapabilityRegistry {
    CapabilityRegistry::builder()
        .register(Arc::new(FundamentalsCapability::new(
            providers.fundamentals,
        )))
        .register(Arc::new(TechnicalCapability::new(providers.market)))
        .register(Arc::new(SentimentCapability::new(providers.sentiment)))
        .register(Arc::new(NewsCapability::new(providers.news)))
        .register(Arc::new(FilingsCapability::new(providers.filings)))
        .register(Arc::new(VerdictHistoryCapability::new(verdicts)))
        .register(Arc::new(SynthesizerCapability::new(providers.synthesizer)))
        .build()
}
