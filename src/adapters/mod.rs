pub mod postgres_accounts;
pub mod postgres_ledger;
pub mod postgres_payments;
pub mod postgres_payouts;

pub use postgres_accounts::PostgresAccountRepository;
pub use postgres_ledger::PostgresLedgerRepository;
pub use postgres_payments::PostgresPaymentRepository;
pub use postgres_payouts::PostgresPayoutRepository;
