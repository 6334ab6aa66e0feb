pub mod account;
pub mod money;
pub mod period;
pub mod recurring;
pub mod transaction;

pub use account::{Account, AccountId, AccountKind};
pub use money::Money;
pub use period::{DateRange, PeriodKey};
pub use recurring::{RecurringDefinition, RecurringDefinitionId, ScheduleRule};
pub use transaction::{Transaction, TransactionId, TxSource, TxStatus, UNCATEGORIZED};
