use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Numeric Constants
// ---------------------------------------------------------------------------

/// RAY = 1e27, the Aave interest rate scale.
pub const RAY_DECIMALS: u32 = 27;

/// Ray rate → percent is a division by 1e25 (1e27 / 100).
pub const RAY_PERCENT_DECIMALS: u32 = RAY_DECIMALS - 2;

/// Seconds in a non-leap year. Aave compounds per second over this period.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Decimals used when none are reported for an asset.
pub const DEFAULT_TOKEN_DECIMALS: u32 = 18;

/// USD values on a `Position` are rounded to cents.
pub const USD_DECIMALS: u32 = 2;

// ---------------------------------------------------------------------------
// Display thresholds
// ---------------------------------------------------------------------------

/// Smallest non-zero USD amount rendered literally.
pub const MIN_DISPLAY_USD: Decimal = dec!(0.01);

/// Smallest non-zero percentage rendered literally.
pub const MIN_DISPLAY_PERCENT: Decimal = dec!(0.01);

/// Balances below this switch to scientific notation.
pub const SCIENTIFIC_BALANCE_THRESHOLD: Decimal = dec!(0.0001);

/// Balances at or above this may use K/M/B suffixes in compact mode.
pub const COMPACT_BALANCE_THRESHOLD: Decimal = dec!(10_000);

/// Health factors above this are shown as infinite.
pub const INFINITE_HEALTH_FACTOR: Decimal = dec!(1_000_000);

pub const INFINITY_SYMBOL: &str = "∞";

// ---------------------------------------------------------------------------
// Aggregation defaults
// ---------------------------------------------------------------------------

/// Flat loan-to-value used to approximate available borrows when upstream
/// does not report them. Real collateral factors vary per asset.
pub const DEFAULT_FALLBACK_LTV: Decimal = dec!(0.8);

/// Local vs upstream account figures further apart than this are logged.
pub const UPSTREAM_DRIFT_TOLERANCE: Decimal = dec!(0.01);

// ---------------------------------------------------------------------------
// Health status thresholds
// ---------------------------------------------------------------------------

pub const HEALTHY_HF: Decimal = dec!(3);
pub const GOOD_HF: Decimal = dec!(1.5);
pub const CAUTION_HF: Decimal = dec!(1.1);

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;

/// Consecutive failed cycles after which the poller escalates to `error!`.
pub const FAILURE_ESCALATION_THRESHOLD: u32 = 5;

// ---------------------------------------------------------------------------
// Savings (sGHO)
// ---------------------------------------------------------------------------

pub const GHO_SYMBOL: &str = "GHO";

/// sGHO contract on Ethereum mainnet.
pub const SGHO_CONTRACT_ADDRESS: &str = "0x1a88df1cfe15af22b3c4c783d4e6f7f9e0c1885d";

pub const DEFAULT_APY_STALE_AFTER_DAYS: i64 = 7;

// ---------------------------------------------------------------------------
// Upstream
// ---------------------------------------------------------------------------

pub const AAVE_GRAPHQL_API: &str = "https://api.v3.aave.com/graphql";

pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;
