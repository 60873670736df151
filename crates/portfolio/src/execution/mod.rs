pub mod aave_client;
