pub mod amazon;
pub mod import;
pub mod normalize;
pub mod recurring;
pub mod rows;
pub mod rules;
pub mod suggest;
pub mod sync;
pub mod transfer;

pub use amazon::{
    AmazonMatcher, AmazonOrder, MatchCandidates, OrderCandidate, OrderMatchResult,
    OrderMatchStatus, OrderPoolTransaction,
};
pub use import::{
    run_import, IgnoreReason, ImportContext, ImportError, ImportMode, ImportOutcome,
    ImportSummary, RawImportRow, RowStatus,
};
pub use normalize::{
    composite_description, expense_amount, hash_key, normalize_amount, normalize_description,
    parse_amount, parse_date, ParseError,
};
pub use recurring::{ConfidenceTier, RecurringMatch, RecurringMatcher};
pub use rows::{read_rows, ColumnMapping, CsvReadError, RawRecord};
pub use rules::{CategoryMappingRule, IgnoreRule, RuleSet};
pub use suggest::{mine_suggestions, RecurringSuggestion};
pub use sync::{
    reconcile_feed, FeedEvent, FeedTransaction, SyncContext, SyncError, SyncOutcome, SyncSummary,
};
pub use transfer::{detect_transfers, TransferClassification, TransferInput, TransferReason};
