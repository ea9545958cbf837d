//! Fixed expenses: the ordered collection behind the monthly-cost total.
//!
//! Expenses live as one rank-sorted list per user under
//! `[fixedExpenses, userId]`. Mutation semantics are deliberately
//! asymmetric: `update_expense` on a missing id is an error (the UI edited
//! a phantom row), while `remove_expense` of a missing id is a silent no-op
//! (the row is gone either way).

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use ratecard_common::cache::{optimistic, QueryKey, QueryStore};
use ratecard_common::error::{ClientError, ClientResult};

/// Resource segment of the expenses cache key
pub const EXPENSES_RESOURCE: &str = "fixedExpenses";

/// Cache key for one user's expense list
pub fn expenses_key(user_id: i64) -> QueryKey {
    QueryKey::new(EXPENSES_RESOURCE, user_id.to_string())
}

/// One recurring monthly cost, camelCase on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedExpense {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub amount: f64,
    /// Display position; lists are kept sorted by rank ascending
    pub rank: i64,
    pub category: Option<String>,
}

/// One human-readable problem with one list item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseIssue {
    pub index: usize,
    pub id: i64,
    pub reason: String,
}

/// Read the cached list; an absent key is an empty list
pub fn current_expenses(store: &dyn QueryStore, user_id: i64) -> ClientResult<Vec<FixedExpense>> {
    Ok(optimistic::current_object(store, &expenses_key(user_id))?.unwrap_or_default())
}

/// Replace the cached list verbatim, preserving the given order
pub fn write_expenses(
    store: &dyn QueryStore,
    user_id: i64,
    expenses: &[FixedExpense],
) -> ClientResult<()> {
    optimistic::write_object(store, &expenses_key(user_id), &expenses)
}

/// Insert an expense, or replace the existing one sharing its id, then
/// re-sort by rank ascending (stable, ties keep their order).
pub fn add_expense(
    store: &dyn QueryStore,
    user_id: i64,
    expense: FixedExpense,
) -> ClientResult<Vec<FixedExpense>> {
    let mut expenses = current_expenses(store, user_id)?;
    match expenses.iter_mut().find(|e| e.id == expense.id) {
        Some(existing) => *existing = expense,
        None => expenses.push(expense),
    }
    expenses.sort_by_key(|e| e.rank);
    write_expenses(store, user_id, &expenses)?;
    Ok(expenses)
}

/// Replace the expense sharing `expense.id`.
///
/// Unlike [`add_expense`] this is not an upsert: a missing id is a
/// [`ClientError::NotFound`].
pub fn update_expense(
    store: &dyn QueryStore,
    user_id: i64,
    expense: FixedExpense,
) -> ClientResult<Vec<FixedExpense>> {
    let mut expenses = current_expenses(store, user_id)?;
    let slot = expenses
        .iter_mut()
        .find(|e| e.id == expense.id)
        .ok_or_else(|| ClientError::not_found("fixedExpense", expense.id))?;
    *slot = expense;
    expenses.sort_by_key(|e| e.rank);
    write_expenses(store, user_id, &expenses)?;
    Ok(expenses)
}

/// Remove the expense with the given id; absent ids are a no-op
pub fn remove_expense(
    store: &dyn QueryStore,
    user_id: i64,
    id: i64,
) -> ClientResult<Vec<FixedExpense>> {
    remove_many(store, user_id, &[id])
}

/// Remove every listed id; absent ids are silently skipped.
///
/// When nothing matches, the cache is left untouched: no entry is created
/// for an absent key, and an invalidated entry keeps its stale flag.
pub fn remove_many(
    store: &dyn QueryStore,
    user_id: i64,
    ids: &[i64],
) -> ClientResult<Vec<FixedExpense>> {
    let doomed: HashSet<i64> = ids.iter().copied().collect();
    let mut expenses = current_expenses(store, user_id)?;
    let before = expenses.len();
    expenses.retain(|e| !doomed.contains(&e.id));
    if expenses.len() != before {
        write_expenses(store, user_id, &expenses)?;
    }
    Ok(expenses)
}

/// Replace the whole list in exactly the given order, no re-sorting.
///
/// The drag-and-drop persistence path: the caller has already assigned
/// ranks and the visual order is authoritative.
pub fn reorder_expenses(
    store: &dyn QueryStore,
    user_id: i64,
    expenses: Vec<FixedExpense>,
) -> ClientResult<Vec<FixedExpense>> {
    write_expenses(store, user_id, &expenses)?;
    Ok(expenses)
}

/// One human-readable reason per invalid item.
///
/// An item needs a name, a positive owner id, and a positive amount.
pub fn validate_expenses(expenses: &[FixedExpense]) -> Vec<ExpenseIssue> {
    let mut issues = Vec::new();
    for (index, expense) in expenses.iter().enumerate() {
        if expense.name.trim().is_empty() {
            issues.push(ExpenseIssue {
                index,
                id: expense.id,
                reason: "name is required".to_string(),
            });
        }
        if expense.user_id <= 0 {
            issues.push(ExpenseIssue {
                index,
                id: expense.id,
                reason: "user id is required".to_string(),
            });
        }
        if expense.amount <= 0.0 {
            issues.push(ExpenseIssue {
                index,
                id: expense.id,
                reason: "amount must be greater than zero".to_string(),
            });
        }
    }
    issues
}

/// Ids appearing more than once in the list
pub fn duplicate_ids(expenses: &[FixedExpense]) -> BTreeSet<i64> {
    let mut seen = HashSet::new();
    let mut duplicates = BTreeSet::new();
    for expense in expenses {
        if !seen.insert(expense.id) {
            duplicates.insert(expense.id);
        }
    }
    duplicates
}

/// Sum of all amounts, the monthly fixed-cost total
pub fn total_amount(expenses: &[FixedExpense]) -> f64 {
    expenses.iter().map(|e| e.amount).sum()
}
