//! The family ledger: transaction events and member balances.

mod core;
mod endpoints;

pub use core::{
    CONFIRMED, EventType, LedgerPolicy, MemberBalance, NewTransactionEvent, TransactionEvent,
    create_ledger_tables, get_balance, get_event, get_member_balance, list_events,
    list_family_balances, post_event, post_event_in, recompute_balance,
};
pub use endpoints::{
    LedgerState, create_transaction_endpoint, get_member_balance_endpoint,
    get_transaction_endpoint, list_family_balances_endpoint, list_transactions_endpoint,
};
