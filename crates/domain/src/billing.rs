//! Billable-cost settings: entity, form transforms, and calculators.
//!
//! Settings are one logical record per user, cached under
//! `[billableCostSettings, userId]` with camelCase field names on the wire.
//! The form layer speaks flat snake_case; [`to_form`]/[`from_form`] convert
//! losslessly in both directions over the shared field set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ratecard_common::cache::{optimistic, OptimisticUpdate, QueryKey, QueryStore};
use ratecard_common::error::ClientResult;
use ratecard_common::validation::{ValidationError, ValidationResult};

/// Resource segment of the settings cache key
pub const SETTINGS_RESOURCE: &str = "billableCostSettings";

/// Cache key for one user's settings record
pub fn settings_key(user_id: i64) -> QueryKey {
    QueryKey::new(SETTINGS_RESOURCE, user_id.to_string())
}

/// Persisted settings record, camelCase on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillableCostSettings {
    pub user_id: i64,
    /// Working days per week
    pub work_days: f64,
    pub hours_per_day: f64,
    /// Days per year
    pub holiday_days: f64,
    pub vacation_days: f64,
    pub sick_leave_days: f64,
    pub monthly_salary: f64,
    pub monthly_expenses: f64,
    /// Markup applied on top of the break-even rate
    pub margin_percent: f64,
}

/// Flat form representation, snake_case field names
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BillableCostForm {
    pub work_days: f64,
    pub hours_per_day: f64,
    pub holiday_days: f64,
    pub vacation_days: f64,
    pub sick_leave_days: f64,
    pub monthly_salary: f64,
    pub monthly_expenses: f64,
    pub margin_percent: f64,
}

/// Settings record -> form fields
pub fn to_form(settings: &BillableCostSettings) -> BillableCostForm {
    BillableCostForm {
        work_days: settings.work_days,
        hours_per_day: settings.hours_per_day,
        holiday_days: settings.holiday_days,
        vacation_days: settings.vacation_days,
        sick_leave_days: settings.sick_leave_days,
        monthly_salary: settings.monthly_salary,
        monthly_expenses: settings.monthly_expenses,
        margin_percent: settings.margin_percent,
    }
}

/// Form fields -> settings record for the given user
pub fn from_form(form: &BillableCostForm, user_id: i64) -> BillableCostSettings {
    BillableCostSettings {
        user_id,
        work_days: form.work_days,
        hours_per_day: form.hours_per_day,
        holiday_days: form.holiday_days,
        vacation_days: form.vacation_days,
        sick_leave_days: form.sick_leave_days,
        monthly_salary: form.monthly_salary,
        monthly_expenses: form.monthly_expenses,
        margin_percent: form.margin_percent,
    }
}

/// Billable hours per year.
///
/// `max(0, work_days * 52 - (holiday + vacation + sick)) * hours_per_day`;
/// the day count clamps at zero before the hours multiplication, so absence
/// overshoot can never produce negative hours.
pub fn billable_hours(form: &BillableCostForm) -> f64 {
    let working_days = form.work_days * 52.0;
    let absence = form.holiday_days + form.vacation_days + form.sick_leave_days;
    (working_days - absence).max(0.0) * form.hours_per_day
}

/// Hourly rate covering costs plus margin.
///
/// Break-even is annual costs spread over billable hours; the margin marks
/// it up. `None` when there are no billable hours to spread costs over.
pub fn hourly_rate(form: &BillableCostForm) -> Option<f64> {
    let hours = billable_hours(form);
    if hours <= 0.0 {
        return None;
    }
    let annual_costs = (form.monthly_salary + form.monthly_expenses) * 12.0;
    let break_even = annual_costs / hours;
    Some(break_even * (1.0 + form.margin_percent / 100.0))
}

/// Field-range validation, run before any cache or network activity
pub fn validate_form(form: &BillableCostForm) -> ValidationResult<()> {
    let mut errors = ValidationError::new();

    if !(0.0..=7.0).contains(&form.work_days) {
        errors.add_field_error("work_days", "must be between 0 and 7");
    }
    if !(0.0..=24.0).contains(&form.hours_per_day) {
        errors.add_field_error("hours_per_day", "must be between 0 and 24");
    }
    if form.holiday_days < 0.0 {
        errors.add_field_error("holiday_days", "must be non-negative");
    }
    if form.vacation_days < 0.0 {
        errors.add_field_error("vacation_days", "must be non-negative");
    }
    if form.sick_leave_days < 0.0 {
        errors.add_field_error("sick_leave_days", "must be non-negative");
    }
    if form.monthly_salary < 0.0 {
        errors.add_field_error("monthly_salary", "must be non-negative");
    }
    if form.monthly_expenses < 0.0 {
        errors.add_field_error("monthly_expenses", "must be non-negative");
    }
    if !(0.0..=100.0).contains(&form.margin_percent) {
        errors.add_field_error("margin_percent", "must be between 0 and 100");
    }

    errors.into_result(())
}

/// Read the cached settings; absence is `Ok(None)`
pub fn current_settings(
    store: &dyn QueryStore,
    user_id: i64,
) -> ClientResult<Option<BillableCostSettings>> {
    optimistic::current_object(store, &settings_key(user_id))
}

/// Replace the cached settings record
pub fn write_settings(store: &dyn QueryStore, settings: &BillableCostSettings) -> ClientResult<()> {
    optimistic::write_object(store, &settings_key(settings.user_id), settings)
}

/// Whether a settings record is cached for the user
pub fn settings_exist(store: &dyn QueryStore, user_id: i64) -> bool {
    optimistic::object_exists(store, &settings_key(user_id))
}

/// Speculatively apply a partial settings update; the returned context
/// rolls the cache back if the server rejects the mutation.
pub fn begin_settings_update(
    store: &dyn QueryStore,
    user_id: i64,
    patch: Value,
) -> ClientResult<OptimisticUpdate> {
    optimistic::begin_optimistic(store, &settings_key(user_id), patch)
}
