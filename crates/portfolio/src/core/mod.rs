pub mod aggregator;
pub mod format;
pub mod normalizer;
pub mod poller;
pub mod rates;
pub mod savings;
pub mod view;
