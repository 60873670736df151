pub mod aave;
pub mod health;
pub mod portfolio;
pub mod position;
pub mod wad_ray;

pub use aave::{RawPortfolio, RawPortfolioResponse, RawPositionRecord, UpstreamAccountState};
pub use health::{HealthFactor, HealthStatus};
pub use portfolio::{AccountContext, DerivedMetrics, Portfolio, PortfolioSnapshot};
pub use position::{Position, PositionSide};
pub use wad_ray::Ray;
