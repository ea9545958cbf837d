//! End-to-end tests for entity mutations through the full pipeline:
//! optimistic write, retried dispatch behind the circuit breaker, server
//! reconciliation or rollback, and instrumentation along the way.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use ratecard_common::cache::{MemoryStore, QueryStore};
use ratecard_common::error::ClientError;
use ratecard_common::observability::PerformanceMonitor;
use ratecard_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryProfile,
};
use ratecard_domain::billing::{
    self, billable_hours, from_form, settings_key, BillableCostForm,
};
use ratecard_domain::expenses::{self, expenses_key, FixedExpense};
use ratecard_domain::mutation::MutationPipeline;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn fast_profile() -> RetryProfile {
    RetryProfile::new(
        RetryConfig::new(2)
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
            .with_jitter(false)
            .with_name("mutation"),
        |error, _| !matches!(error, ClientError::Validation { .. }),
    )
}

fn pipeline(store: Arc<MemoryStore>, threshold: u32) -> (MutationPipeline, Arc<PerformanceMonitor>) {
    let breaker = Arc::new(
        CircuitBreaker::new(
            CircuitBreakerConfig::new("saveSettings")
                .with_failure_threshold(threshold)
                .with_reset_timeout(Duration::from_secs(30)),
        )
        .unwrap(),
    );
    let monitor = Arc::new(PerformanceMonitor::default());
    let p = MutationPipeline::new(store, breaker, monitor.clone()).with_profile(fast_profile());
    (p, monitor)
}

fn nominal_form() -> BillableCostForm {
    BillableCostForm {
        work_days: 5.0,
        hours_per_day: 8.0,
        holiday_days: 12.0,
        vacation_days: 20.0,
        sick_leave_days: 5.0,
        monthly_salary: 4000.0,
        monthly_expenses: 800.0,
        margin_percent: 20.0,
    }
}

/// Validates the happy path for a settings edit.
///
/// # Test Steps
/// 1. Seed cached settings from the nominal form
/// 2. Patch hoursPerDay optimistically through the pipeline
/// 3. The dispatch observes the patched cache and returns the server echo
/// 4. The cache holds the server value; derived hours update accordingly
#[tokio::test(flavor = "multi_thread")]
async fn settings_edit_end_to_end() {
    init_tracing();
    let store = Arc::new(MemoryStore::default());
    let settings = from_form(&nominal_form(), 7);
    billing::write_settings(store.as_ref(), &settings).unwrap();
    let (p, monitor) = pipeline(store.clone(), 3);

    let mut server_echo = serde_json::to_value(&settings).unwrap();
    server_echo["hoursPerDay"] = json!(6.0);
    let echo = server_echo.clone();

    let observer = store.clone();
    let result = p
        .run_optimistic(&settings_key(7), json!({"hoursPerDay": 6.0}), move || {
            let observer = observer.clone();
            let echo = echo.clone();
            async move {
                let during = billing::current_settings(observer.as_ref(), 7)
                    .unwrap()
                    .unwrap();
                assert_eq!(during.hours_per_day, 6.0);
                Ok(echo)
            }
        })
        .await
        .unwrap();

    assert_eq!(result["hoursPerDay"], 6.0);
    let stored = billing::current_settings(store.as_ref(), 7).unwrap().unwrap();
    assert_eq!(stored.hours_per_day, 6.0);

    // Derived value follows: 223 days x 6h
    assert_eq!(billable_hours(&billing::to_form(&stored)), 1338.0);

    // The pipeline recorded a successful cache operation
    let report = monitor.generate_report();
    assert_eq!(report.operations.len(), 1);
    assert_eq!(report.operations[0].failures, 0);
}

/// Validates rejection recovery: the server refuses the edit, the cache
/// rolls back to the pre-edit settings, and the failure is instrumented.
#[tokio::test(flavor = "multi_thread")]
async fn rejected_settings_edit_rolls_back() {
    init_tracing();
    let store = Arc::new(MemoryStore::default());
    let settings = from_form(&nominal_form(), 7);
    billing::write_settings(store.as_ref(), &settings).unwrap();
    let (p, monitor) = pipeline(store.clone(), 3);

    let result = p
        .run_optimistic(&settings_key(7), json!({"hoursPerDay": 6.0}), || async {
            Err::<Value, _>(ClientError::api_status(422, "rejected"))
        })
        .await;

    assert!(result.is_err());
    let restored = billing::current_settings(store.as_ref(), 7).unwrap().unwrap();
    assert_eq!(restored, settings);

    let report = monitor.generate_report();
    assert_eq!(report.operations[0].failures, 1);
}

/// Validates the expense-list flow through the pipeline: an optimistic
/// append is confirmed by the server's re-ranked list.
#[tokio::test(flavor = "multi_thread")]
async fn expense_add_reconciles_with_server_ranking() {
    init_tracing();
    let store = Arc::new(MemoryStore::default());
    let rent = FixedExpense {
        id: 1,
        user_id: 7,
        name: "rent".into(),
        amount: 1200.0,
        rank: 2,
        category: None,
    };
    expenses::write_expenses(store.as_ref(), 7, &[rent.clone()]).unwrap();
    let (p, _monitor) = pipeline(store.clone(), 3);

    let insurance = FixedExpense {
        id: 2,
        user_id: 7,
        name: "insurance".into(),
        amount: 90.0,
        rank: 1,
        category: Some("fixed".into()),
    };
    let server_list = json!([
        serde_json::to_value(&insurance).unwrap(),
        serde_json::to_value(&rent).unwrap(),
    ]);
    let echo = server_list.clone();

    let result = p
        .run_optimistic(&expenses_key(7), server_list.clone(), move || {
            let echo = echo.clone();
            async move { Ok(echo) }
        })
        .await
        .unwrap();

    assert_eq!(result, server_list);
    let list = expenses::current_expenses(store.as_ref(), 7).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, 2, "server ranking preserved");
    assert_eq!(expenses::total_amount(&list), 1290.0);
}

/// Validates a failed create through the pipeline leaves the collection key
/// absent rather than cached as an empty or null document.
#[tokio::test(flavor = "multi_thread")]
async fn failed_first_mutation_leaves_no_residue() {
    init_tracing();
    let store = Arc::new(MemoryStore::default());
    let (p, _monitor) = pipeline(store.clone(), 3);

    let result = p
        .run_optimistic(&expenses_key(7), json!([{"id": 1}]), || async {
            Err::<Value, _>(ClientError::api_status(500, "boom"))
        })
        .await;

    assert!(result.is_err());
    assert!(!store.contains(&expenses_key(7)));
    // The domain read still treats absence as an empty list
    assert!(expenses::current_expenses(store.as_ref(), 7).unwrap().is_empty());
}

/// Validates breaker behavior across repeated failures and recovery.
///
/// # Test Steps
/// 1. Two failing mutations (each an exhausted retry sequence) open the
///    breaker
/// 2. A third mutation is rejected without dispatching and rolls back
/// 3. After reset() the pipeline dispatches again
#[tokio::test(flavor = "multi_thread")]
async fn breaker_opens_then_recovers_after_reset() {
    init_tracing();
    let store = Arc::new(MemoryStore::default());
    let (p, _monitor) = pipeline(store.clone(), 2);

    for _ in 0..2 {
        let _ = p
            .run_optimistic(&settings_key(7), json!({"workDays": 4.0}), || async {
                Err::<Value, _>(ClientError::api_status(503, "down"))
            })
            .await;
    }
    assert_eq!(p.breaker().state(), CircuitState::Open);

    let dispatched = Arc::new(AtomicU32::new(0));
    let counter = dispatched.clone();
    let rejected = p
        .run_optimistic(&settings_key(7), json!({"workDays": 4.0}), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(json!({"workDays": 4.0})) }
        })
        .await;
    assert!(matches!(rejected, Err(ClientError::CircuitOpen { .. })));
    assert_eq!(dispatched.load(Ordering::SeqCst), 0);
    assert!(!store.contains(&settings_key(7)));

    p.breaker().reset();
    let result = p
        .run_optimistic(&settings_key(7), json!({"workDays": 4.0}), || async {
            Ok(json!({"workDays": 4.0, "userId": 7}))
        })
        .await;
    assert!(result.is_ok());
    assert!(store.contains(&settings_key(7)));
}
